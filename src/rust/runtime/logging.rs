// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//==============================================================================
// Imports
//==============================================================================

use ::flexi_logger::Logger;
use ::std::sync::Once;

//==============================================================================
// Static Variables
//==============================================================================

/// Guardian to the logging initialize function.
static INIT_LOG: Once = Once::new();

//==============================================================================
// Standalone Functions
//==============================================================================

/// Initializes logging features. Log levels are read from `RUST_LOG`; nothing is logged when it is unset.
pub fn initialize() {
    INIT_LOG.call_once(|| {
        if let Err(e) = Logger::try_with_env_or_str("").and_then(|logger| logger.start()) {
            eprintln!("failed to initialize logger: {:?}", e);
        }
    });
}
