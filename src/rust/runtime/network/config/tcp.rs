// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//==============================================================================
// Imports
//==============================================================================

use crate::runtime::{
    fail::Fail,
    network::consts::{
        DEFAULT_MSS,
        DEFAULT_TTL,
        DEFAULT_WINDOW_SIZE,
        MAX_MSS,
        MIN_MSS,
        TCP_FIN_WAIT_TIMEOUT,
        TCP_INITIAL_RTO,
        TCP_MSL,
        TCP_BACKOFF,
        TCP_SYN_RCVD_TIMEOUT,
        TCP_TICK_INTERVAL,
    },
};
use ::libc::{
    EINVAL,
    ERANGE,
};
use ::std::{
    ops::Index,
    time::Duration,
};
use ::yaml_rust::{
    Yaml,
    YamlLoader,
};

//==============================================================================
// Constants
//==============================================================================

mod tcp_config {
    pub const SECTION_NAME: &str = "tcp";
    pub const MSS: &str = "mss";
    pub const RECEIVE_WINDOW_SIZE: &str = "receive_window_size";
    pub const SEND_BUFFER_SIZE: &str = "send_buffer_size";
    pub const SEND_QUEUE_LENGTH: &str = "send_queue_length";
    pub const MAX_RETRANSMISSIONS: &str = "max_retransmissions";
    pub const SYN_RETRANSMISSIONS: &str = "syn_retransmissions";
    pub const TICK_INTERVAL_MS: &str = "tick_interval_ms";
    pub const MSL_MS: &str = "msl_ms";
    pub const FIN_WAIT_TIMEOUT_MS: &str = "fin_wait_timeout_ms";
    pub const SYN_RCVD_TIMEOUT_MS: &str = "syn_rcvd_timeout_ms";
    pub const DELAYED_ACK: &str = "delayed_ack";
    pub const TIMESTAMPS: &str = "timestamps";
    pub const OOSEQ_MAX_BYTES: &str = "ooseq_max_bytes";
    pub const OOSEQ_MAX_ENTRIES: &str = "ooseq_max_entries";
    pub const MAX_CONNECTIONS: &str = "max_connections";
    pub const LISTEN_BACKLOG: &str = "listen_backlog";
    pub const CHECKSUM_OFFLOAD: &str = "checksum_offload";
}

//==============================================================================
// Structures
//==============================================================================

/// TCP Configuration Descriptor
#[derive(Clone, Debug)]
pub struct TcpConfig {
    /// Advertised Maximum Segment Size. Also the upper bound accepted from a peer.
    advertised_mss: usize,
    /// Receive Window Size
    receive_window_size: u32,
    /// Bytes the Application May Have Queued and Unacknowledged
    send_buffer_size: u32,
    /// Segments Allowed on the Unsent and Unacked Queues Together
    send_queue_length: usize,
    /// Retransmissions of Data Before Giving Up
    max_retransmissions: u32,
    /// Retransmissions of a SYN Before Giving Up
    syn_retransmissions: u32,
    /// Period of the Protocol Tick
    tick_interval: Duration,
    /// Maximum Segment Lifetime
    msl: Duration,
    /// FIN_WAIT_2 Timeout After the Receive Side Is Closed
    fin_wait_timeout: Duration,
    /// SYN_RCVD Timeout
    syn_rcvd_timeout: Duration,
    /// Initial Retransmission Timeout
    initial_rto: Duration,
    /// Delay Acknowledgement of In-Sequence Data?
    delayed_ack: bool,
    /// Offer and Echo the Timestamp Option?
    timestamps: bool,
    /// Cap on Bytes Held in the Out-of-Order Cache
    ooseq_max_bytes: Option<usize>,
    /// Cap on Entries Held in the Out-of-Order Cache
    ooseq_max_entries: Option<usize>,
    /// Size of the Active Connection Table
    max_connections: usize,
    /// Half-Open Connections per Listener
    listen_backlog: usize,
    /// Time-to-Live for Outgoing Segments
    ttl: u8,
    /// Offload Checksum to Hardware When Receiving?
    rx_checksum_offload: bool,
    /// Offload Checksum to Hardware When Sending?
    tx_checksum_offload: bool,
}

//==============================================================================
// Associate Functions
//==============================================================================

/// Associate Functions for TCP Configuration Descriptor
impl TcpConfig {
    /// Reads the `tcp` section of a YAML document. Keys that are absent keep their default values.
    pub fn from_yaml_str(config_s: &str) -> Result<Self, Fail> {
        let config: Vec<Yaml> = match YamlLoader::load_from_str(config_s) {
            Ok(config) => config,
            Err(e) => {
                let message: String = format!("malformed configuration: {}", e);
                return Err(Fail::new(EINVAL, message.as_str()));
            },
        };
        let config_obj: &Yaml = match &config[..] {
            [c] => c,
            _ => return Err(Fail::new(EINVAL, "Wrong number of config objects")),
        };
        let section: &Yaml = match config_obj.index(tcp_config::SECTION_NAME) {
            Yaml::BadValue => return Ok(Self::default()),
            section @ Yaml::Hash(_) => section,
            _ => {
                let message: String = format!("parameter \"{}\" has unexpected type", tcp_config::SECTION_NAME);
                return Err(Fail::new(EINVAL, message.as_str()));
            },
        };

        let mut options: Self = Self::default();
        if let Some(value) = Self::get_int_option::<usize>(section, tcp_config::MSS)? {
            options = options.set_advertised_mss(value)?;
        }
        if let Some(value) = Self::get_int_option::<u32>(section, tcp_config::RECEIVE_WINDOW_SIZE)? {
            options = options.set_receive_window_size(value)?;
        }
        if let Some(value) = Self::get_int_option::<u32>(section, tcp_config::SEND_BUFFER_SIZE)? {
            options = options.set_send_buffer_size(value)?;
        }
        if let Some(value) = Self::get_int_option::<usize>(section, tcp_config::SEND_QUEUE_LENGTH)? {
            options = options.set_send_queue_length(value)?;
        }
        if let Some(value) = Self::get_int_option::<u32>(section, tcp_config::MAX_RETRANSMISSIONS)? {
            options = options.set_max_retransmissions(value)?;
        }
        if let Some(value) = Self::get_int_option::<u32>(section, tcp_config::SYN_RETRANSMISSIONS)? {
            options = options.set_syn_retransmissions(value)?;
        }
        if let Some(value) = Self::get_int_option::<u64>(section, tcp_config::TICK_INTERVAL_MS)? {
            options = options.set_tick_interval(Duration::from_millis(value))?;
        }
        if let Some(value) = Self::get_int_option::<u64>(section, tcp_config::MSL_MS)? {
            options = options.set_msl(Duration::from_millis(value))?;
        }
        if let Some(value) = Self::get_int_option::<u64>(section, tcp_config::FIN_WAIT_TIMEOUT_MS)? {
            options = options.set_fin_wait_timeout(Duration::from_millis(value))?;
        }
        if let Some(value) = Self::get_int_option::<u64>(section, tcp_config::SYN_RCVD_TIMEOUT_MS)? {
            options = options.set_syn_rcvd_timeout(Duration::from_millis(value))?;
        }
        if let Some(value) = Self::get_bool_option(section, tcp_config::DELAYED_ACK)? {
            options = options.set_delayed_ack(value);
        }
        if let Some(value) = Self::get_bool_option(section, tcp_config::TIMESTAMPS)? {
            options = options.set_timestamps(value);
        }
        if let Some(value) = Self::get_int_option::<usize>(section, tcp_config::OOSEQ_MAX_BYTES)? {
            options = options.set_ooseq_max_bytes(Some(value));
        }
        if let Some(value) = Self::get_int_option::<usize>(section, tcp_config::OOSEQ_MAX_ENTRIES)? {
            options = options.set_ooseq_max_entries(Some(value));
        }
        if let Some(value) = Self::get_int_option::<usize>(section, tcp_config::MAX_CONNECTIONS)? {
            options = options.set_max_connections(value)?;
        }
        if let Some(value) = Self::get_int_option::<usize>(section, tcp_config::LISTEN_BACKLOG)? {
            options = options.set_listen_backlog(value)?;
        }
        if let Some(value) = Self::get_bool_option(section, tcp_config::CHECKSUM_OFFLOAD)? {
            options = options.set_checksum_offload(value, value);
        }

        Ok(options)
    }

    /// Gets the advertised maximum segment size in the target [TcpConfig].
    pub fn get_advertised_mss(&self) -> usize {
        self.advertised_mss
    }

    /// Gets the receiver window size in the target [TcpConfig].
    pub fn get_receive_window_size(&self) -> u32 {
        self.receive_window_size
    }

    pub fn get_send_buffer_size(&self) -> u32 {
        self.send_buffer_size
    }

    pub fn get_send_queue_length(&self) -> usize {
        self.send_queue_length
    }

    pub fn get_max_retransmissions(&self) -> u32 {
        self.max_retransmissions
    }

    pub fn get_syn_retransmissions(&self) -> u32 {
        self.syn_retransmissions
    }

    pub fn get_tick_interval(&self) -> Duration {
        self.tick_interval
    }

    pub fn get_msl(&self) -> Duration {
        self.msl
    }

    pub fn get_fin_wait_timeout(&self) -> Duration {
        self.fin_wait_timeout
    }

    pub fn get_syn_rcvd_timeout(&self) -> Duration {
        self.syn_rcvd_timeout
    }

    pub fn get_initial_rto(&self) -> Duration {
        self.initial_rto
    }

    pub fn get_delayed_ack(&self) -> bool {
        self.delayed_ack
    }

    pub fn get_timestamps(&self) -> bool {
        self.timestamps
    }

    pub fn get_ooseq_max_bytes(&self) -> Option<usize> {
        self.ooseq_max_bytes
    }

    pub fn get_ooseq_max_entries(&self) -> Option<usize> {
        self.ooseq_max_entries
    }

    pub fn get_max_connections(&self) -> usize {
        self.max_connections
    }

    pub fn get_listen_backlog(&self) -> usize {
        self.listen_backlog
    }

    pub fn get_ttl(&self) -> u8 {
        self.ttl
    }

    /// Gets the TX hardware checksum offload option in the target [TcpConfig].
    pub fn get_tx_checksum_offload(&self) -> bool {
        self.tx_checksum_offload
    }

    /// Gets the RX hardware checksum offload option in the target [TcpConfig].
    pub fn get_rx_checksum_offload(&self) -> bool {
        self.rx_checksum_offload
    }

    /// Converts a duration into whole protocol ticks, rounding up. Never returns zero.
    pub fn to_ticks(&self, duration: Duration) -> u32 {
        let interval: u128 = self.tick_interval.as_millis().max(1);
        let ticks: u128 = (duration.as_millis() + interval - 1) / interval;
        ticks.clamp(1, u32::MAX as u128) as u32
    }

    /// Ticks spent in TIME_WAIT and LAST_ACK: twice the maximum segment lifetime.
    pub fn time_wait_ticks(&self) -> u32 {
        self.to_ticks(self.msl).saturating_mul(2)
    }

    /// Sets the advertised maximum segment size in the target [TcpConfig].
    pub fn set_advertised_mss(mut self, value: usize) -> Result<Self, Fail> {
        if !(MIN_MSS..=MAX_MSS).contains(&value) {
            return Err(Fail::new(ERANGE, "mss out of range"));
        }
        self.advertised_mss = value;
        Ok(self)
    }

    /// Sets the receiver window size in the target [TcpConfig].
    pub fn set_receive_window_size(mut self, value: u32) -> Result<Self, Fail> {
        if value == 0 || value > u16::MAX as u32 {
            return Err(Fail::new(ERANGE, "receive window out of range"));
        }
        self.receive_window_size = value;
        Ok(self)
    }

    pub fn set_send_buffer_size(mut self, value: u32) -> Result<Self, Fail> {
        if value == 0 {
            return Err(Fail::new(EINVAL, "send buffer must not be empty"));
        }
        self.send_buffer_size = value;
        Ok(self)
    }

    pub fn set_send_queue_length(mut self, value: usize) -> Result<Self, Fail> {
        if value == 0 {
            return Err(Fail::new(EINVAL, "send queue must hold at least one segment"));
        }
        self.send_queue_length = value;
        Ok(self)
    }

    pub fn set_max_retransmissions(mut self, value: u32) -> Result<Self, Fail> {
        if value == 0 || value as usize >= TCP_BACKOFF.len() {
            return Err(Fail::new(ERANGE, "retransmission count out of range"));
        }
        self.max_retransmissions = value;
        Ok(self)
    }

    pub fn set_syn_retransmissions(mut self, value: u32) -> Result<Self, Fail> {
        if value == 0 || value as usize >= TCP_BACKOFF.len() {
            return Err(Fail::new(ERANGE, "retransmission count out of range"));
        }
        self.syn_retransmissions = value;
        Ok(self)
    }

    pub fn set_tick_interval(mut self, value: Duration) -> Result<Self, Fail> {
        if value.is_zero() {
            return Err(Fail::new(EINVAL, "tick interval must not be zero"));
        }
        self.tick_interval = value;
        Ok(self)
    }

    pub fn set_msl(mut self, value: Duration) -> Result<Self, Fail> {
        if value.is_zero() {
            return Err(Fail::new(EINVAL, "msl must not be zero"));
        }
        self.msl = value;
        Ok(self)
    }

    pub fn set_fin_wait_timeout(mut self, value: Duration) -> Result<Self, Fail> {
        if value.is_zero() {
            return Err(Fail::new(EINVAL, "FIN_WAIT_2 timeout must not be zero"));
        }
        self.fin_wait_timeout = value;
        Ok(self)
    }

    pub fn set_syn_rcvd_timeout(mut self, value: Duration) -> Result<Self, Fail> {
        if value.is_zero() {
            return Err(Fail::new(EINVAL, "SYN_RCVD timeout must not be zero"));
        }
        self.syn_rcvd_timeout = value;
        Ok(self)
    }

    pub fn set_delayed_ack(mut self, value: bool) -> Self {
        self.delayed_ack = value;
        self
    }

    pub fn set_timestamps(mut self, value: bool) -> Self {
        self.timestamps = value;
        self
    }

    pub fn set_ooseq_max_bytes(mut self, value: Option<usize>) -> Self {
        self.ooseq_max_bytes = value;
        self
    }

    pub fn set_ooseq_max_entries(mut self, value: Option<usize>) -> Self {
        self.ooseq_max_entries = value;
        self
    }

    pub fn set_max_connections(mut self, value: usize) -> Result<Self, Fail> {
        if value == 0 {
            return Err(Fail::new(EINVAL, "connection table must not be empty"));
        }
        self.max_connections = value;
        Ok(self)
    }

    pub fn set_listen_backlog(mut self, value: usize) -> Result<Self, Fail> {
        if value == 0 {
            return Err(Fail::new(EINVAL, "listen backlog must not be empty"));
        }
        self.listen_backlog = value;
        Ok(self)
    }

    pub fn set_checksum_offload(mut self, rx: bool, tx: bool) -> Self {
        self.rx_checksum_offload = rx;
        self.tx_checksum_offload = tx;
        self
    }

    /// Looks up an optional integer at `index`, checking that the destination type can hold it.
    fn get_int_option<T: TryFrom<i64>>(yaml: &Yaml, index: &str) -> Result<Option<T>, Fail> {
        match yaml.index(index) {
            Yaml::BadValue => Ok(None),
            Yaml::Integer(val) => match T::try_from(*val) {
                Ok(val) => Ok(Some(val)),
                _ => {
                    let message: String = format!("parameter \"{}\" is out of range", index);
                    Err(Fail::new(ERANGE, message.as_str()))
                },
            },
            _ => {
                let message: String = format!("parameter {} has unexpected type", index);
                Err(Fail::new(EINVAL, message.as_str()))
            },
        }
    }

    fn get_bool_option(yaml: &Yaml, index: &str) -> Result<Option<bool>, Fail> {
        match yaml.index(index) {
            Yaml::BadValue => Ok(None),
            Yaml::Boolean(val) => Ok(Some(*val)),
            _ => {
                let message: String = format!("parameter {} has unexpected type", index);
                Err(Fail::new(EINVAL, message.as_str()))
            },
        }
    }
}

//==============================================================================
// Trait Implementations
//==============================================================================

/// Default Trait Implementation for TCP Configuration Descriptor
impl Default for TcpConfig {
    /// Creates a TCP Configuration Descriptor with the default values.
    fn default() -> Self {
        TcpConfig {
            advertised_mss: DEFAULT_MSS,
            receive_window_size: DEFAULT_WINDOW_SIZE,
            send_buffer_size: DEFAULT_WINDOW_SIZE,
            send_queue_length: 16,
            max_retransmissions: 12,
            syn_retransmissions: 6,
            tick_interval: TCP_TICK_INTERVAL,
            msl: TCP_MSL,
            fin_wait_timeout: TCP_FIN_WAIT_TIMEOUT,
            syn_rcvd_timeout: TCP_SYN_RCVD_TIMEOUT,
            initial_rto: TCP_INITIAL_RTO,
            delayed_ack: true,
            timestamps: false,
            ooseq_max_bytes: None,
            ooseq_max_entries: None,
            max_connections: 64,
            listen_backlog: 8,
            ttl: DEFAULT_TTL,
            rx_checksum_offload: false,
            tx_checksum_offload: false,
        }
    }
}

//==============================================================================
// Unit Tests
//==============================================================================
