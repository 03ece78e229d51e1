// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

pub mod congestion_control;
mod ctrlblk;
mod ooseq;
mod queue;
mod receiver;
mod rto;
mod sender;
mod state_machine;
mod timers;

pub use self::ctrlblk::{
    ControlBlock,
    Disposition,
    State,
};
