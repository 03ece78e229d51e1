// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

mod buffer;

//==============================================================================
// Exports
//==============================================================================

pub use self::buffer::*;
