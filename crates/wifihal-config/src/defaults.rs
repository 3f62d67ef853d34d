use crate::logging::LogFormat;

/// Default log filter expression used by the daemon.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Generic netlink family that carries wireless commands.
pub const DEFAULT_FAMILY_NAME: &str = "nl80211";

/// Port slot of the command channel. Ports are derived as
/// `(pid & 0x3FFFFF) + (slot << 22)`.
pub const DEFAULT_COMMAND_PORT_SLOT: u32 = 644;

/// Port slot of the event channel.
pub const DEFAULT_EVENT_PORT_SLOT: u32 = 645;

/// Upper bound on an encoded request, headers included.
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 4096;

/// Size of the buffer used for each `recv` on either channel.
pub const DEFAULT_RECEIVE_BUFFER_SIZE: usize = 8192;

/// Highest usable port slot; the slot occupies the top ten bits of the port.
pub const MAX_PORT_SLOT: u32 = (1 << 10) - 1;

/// Smallest request buffer able to hold the netlink and generic headers.
pub const MIN_MESSAGE_SIZE: usize = 20;

/// Owned log filter value used where allocation is required (e.g. serde).
pub fn default_log_filter() -> String {
    DEFAULT_LOG_FILTER.to_owned()
}

/// Default logging format for the daemon.
pub fn default_log_format() -> LogFormat {
    LogFormat::Json
}

/// Owned family name used by serde defaults.
pub fn default_family_name() -> String {
    DEFAULT_FAMILY_NAME.to_owned()
}

pub(crate) const fn default_command_port_slot() -> u32 {
    DEFAULT_COMMAND_PORT_SLOT
}

pub(crate) const fn default_event_port_slot() -> u32 {
    DEFAULT_EVENT_PORT_SLOT
}

pub(crate) const fn default_max_message_size() -> usize {
    DEFAULT_MAX_MESSAGE_SIZE
}

pub(crate) const fn default_receive_buffer_size() -> usize {
    DEFAULT_RECEIVE_BUFFER_SIZE
}
