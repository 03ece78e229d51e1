// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

mod protocol;

pub use self::protocol::IpProtocol;
