// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

mod chain;
mod databuffer;

//==============================================================================
// Exports
//==============================================================================

pub use self::{
    chain::BufferChain,
    databuffer::DataBuffer,
};
