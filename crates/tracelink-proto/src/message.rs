//! The decoded message value type.

use std::fmt;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_repr::{Deserialize_repr, Serialize_repr};

use crate::args::Argument;
use crate::ident::ShortId;

/// Verbose bit of the extended-header `msin` field.
const MSIN_VERBOSE: u8 = 0x01;
/// Message type field of `msin`.
const MSIN_TYPE_MASK: u8 = 0x0E;
const MSIN_TYPE_SHIFT: u8 = 1;
/// Message subtype field of `msin`.
const MSIN_SUBTYPE_MASK: u8 = 0xF0;
const MSIN_SUBTYPE_SHIFT: u8 = 4;

/// Message type carried in the extended header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize_repr, Deserialize_repr)]
#[repr(u8)]
pub enum MessageType {
    /// Log message.
    Log = 0,
    /// Application trace message.
    AppTrace = 1,
    /// Network trace message.
    NwTrace = 2,
    /// Control request/response.
    Control = 3,
}

impl MessageType {
    fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(Self::Log),
            1 => Some(Self::AppTrace),
            2 => Some(Self::NwTrace),
            3 => Some(Self::Control),
            _ => None,
        }
    }

    /// Viewer-style name of the type.
    pub fn name(self) -> &'static str {
        match self {
            Self::Log => "log",
            Self::AppTrace => "app_trace",
            Self::NwTrace => "nw_trace",
            Self::Control => "control",
        }
    }
}

/// Severity of a log-type message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize_repr, Deserialize_repr)]
#[repr(u8)]
pub enum LogLevel {
    /// Fatal error, system unusable.
    Fatal = 1,
    /// Error with impact.
    Error = 2,
    /// Warning, correct behavior not ensured.
    Warn = 3,
    /// High-level information.
    Info = 4,
    /// Debug detail.
    Debug = 5,
    /// Highest-volume detail.
    Verbose = 6,
}

impl LogLevel {
    fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            1 => Some(Self::Fatal),
            2 => Some(Self::Error),
            3 => Some(Self::Warn),
            4 => Some(Self::Info),
            5 => Some(Self::Debug),
            6 => Some(Self::Verbose),
            _ => None,
        }
    }

    /// Viewer-style name of the level.
    pub fn name(self) -> &'static str {
        match self {
            Self::Fatal => "fatal",
            Self::Error => "error",
            Self::Warn => "warn",
            Self::Info => "info",
            Self::Debug => "debug",
            Self::Verbose => "verbose",
        }
    }
}

/// Extended-header fields: message info byte and filtering ids.
///
/// The info byte is kept raw so unknown type/subtype combinations survive a
/// decode/encode round trip; accessors expose the decoded view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtendedInfo {
    /// Raw message info byte.
    pub msin: u8,
    /// Application id.
    pub app_id: ShortId,
    /// Context id.
    pub context_id: ShortId,
}

impl ExtendedInfo {
    /// Build an info block for a log message.
    pub fn log(level: LogLevel, verbose: bool, app_id: ShortId, context_id: ShortId) -> Self {
        let msin = ((level as u8) << MSIN_SUBTYPE_SHIFT)
            | ((MessageType::Log as u8) << MSIN_TYPE_SHIFT)
            | if verbose { MSIN_VERBOSE } else { 0 };
        Self { msin, app_id, context_id }
    }

    /// True when the payload self-describes its arguments.
    pub fn verbose(&self) -> bool {
        self.msin & MSIN_VERBOSE != 0
    }

    /// Decoded message type, if the raw value names one.
    pub fn message_type(&self) -> Option<MessageType> {
        MessageType::from_raw((self.msin & MSIN_TYPE_MASK) >> MSIN_TYPE_SHIFT)
    }

    /// Raw subtype field (log level, trace kind, control kind).
    pub fn subtype(&self) -> u8 {
        (self.msin & MSIN_SUBTYPE_MASK) >> MSIN_SUBTYPE_SHIFT
    }

    /// Log level, for log-type messages with a known level.
    pub fn log_level(&self) -> Option<LogLevel> {
        match self.message_type() {
            Some(MessageType::Log) => LogLevel::from_raw(self.subtype()),
            _ => None,
        }
    }
}

/// Message payload in one of the two wire modes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Payload {
    /// Self-describing typed arguments.
    Verbose(Vec<Argument>),
    /// Opaque bytes, interpreted via an external message-id table.
    NonVerbose(Bytes),
}

impl Payload {
    /// An empty verbose payload.
    pub fn empty() -> Self {
        Self::Verbose(Vec::new())
    }
}

/// One decoded frame, immutable once built.
///
/// Equality compares the decoded fields only; the retained raw bytes and the
/// trailing-data diagnostic are excluded so a programmatically built message
/// equals its decoded round trip.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub(crate) version: u8,
    pub(crate) counter: u8,
    pub(crate) ecu_id: ShortId,
    pub(crate) seconds: u32,
    pub(crate) microseconds: i32,
    pub(crate) extra_ecu: Option<ShortId>,
    pub(crate) session_id: Option<u32>,
    pub(crate) device_timestamp: Option<u32>,
    pub(crate) big_endian_payload: bool,
    pub(crate) extended: Option<ExtendedInfo>,
    pub(crate) payload: Payload,
    pub(crate) trailing_bytes: usize,
    pub(crate) raw: Bytes,
}

impl Message {
    /// Start building a message programmatically.
    pub fn builder() -> MessageBuilder {
        MessageBuilder::default()
    }

    /// Standard-header version bits.
    pub fn version(&self) -> u8 {
        self.version
    }

    /// Producer message counter (wrapping; diagnostics only, never used for
    /// ordering).
    pub fn counter(&self) -> u8 {
        self.counter
    }

    /// ECU id from the storage header.
    pub fn ecu_id(&self) -> ShortId {
        self.ecu_id
    }

    /// Seconds part of the receive timestamp.
    pub fn timestamp_seconds(&self) -> u32 {
        self.seconds
    }

    /// Microseconds part of the receive timestamp.
    pub fn timestamp_microseconds(&self) -> i32 {
        self.microseconds
    }

    /// Receive timestamp as fractional seconds since the Unix epoch.
    pub fn storage_timestamp(&self) -> f64 {
        f64::from(self.seconds) + f64::from(self.microseconds) * 1e-6
    }

    /// ECU id repeated in the header extra block, when present.
    pub fn extra_ecu(&self) -> Option<ShortId> {
        self.extra_ecu
    }

    /// Producer session id, when present.
    pub fn session_id(&self) -> Option<u32> {
        self.session_id
    }

    /// Device uptime at emission in 0.1 ms ticks, when present.
    pub fn device_timestamp(&self) -> Option<u32> {
        self.device_timestamp
    }

    /// True when the payload integers are big-endian.
    pub fn big_endian_payload(&self) -> bool {
        self.big_endian_payload
    }

    /// Extended-header fields, when present.
    pub fn extended(&self) -> Option<&ExtendedInfo> {
        self.extended.as_ref()
    }

    /// Application id, or the empty id without an extended header.
    pub fn app_id(&self) -> ShortId {
        self.extended.map_or(ShortId::EMPTY, |ext| ext.app_id)
    }

    /// Context id, or the empty id without an extended header.
    pub fn context_id(&self) -> ShortId {
        self.extended.map_or(ShortId::EMPTY, |ext| ext.context_id)
    }

    /// True when the payload self-describes its arguments.
    pub fn verbose(&self) -> bool {
        self.extended.as_ref().is_some_and(ExtendedInfo::verbose)
    }

    /// The decoded payload.
    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    /// Non-verbose message id: the leading word of the opaque payload, or
    /// zero when the payload is verbose or too short to carry one.
    pub fn message_id(&self) -> u32 {
        match &self.payload {
            Payload::NonVerbose(data) => data.get(..4).map_or(0, |bytes| {
                let word: [u8; 4] = bytes.try_into().unwrap_or([0; 4]);
                if self.big_endian_payload {
                    u32::from_be_bytes(word)
                } else {
                    u32::from_le_bytes(word)
                }
            }),
            Payload::Verbose(_) => 0,
        }
    }

    /// Bytes left over after the declared argument count was decoded.
    ///
    /// Recorded for diagnostics; nonzero values indicate a sloppy producer,
    /// not a decode failure.
    pub fn trailing_bytes(&self) -> usize {
        self.trailing_bytes
    }

    /// The exact frame bytes this message was decoded from.
    ///
    /// Empty for programmatically built messages. Persisting these bytes
    /// reproduces the wire frame exactly.
    pub fn raw_bytes(&self) -> &Bytes {
        &self.raw
    }
}

impl PartialEq for Message {
    fn eq(&self, other: &Self) -> bool {
        self.version == other.version
            && self.counter == other.counter
            && self.ecu_id == other.ecu_id
            && self.seconds == other.seconds
            && self.microseconds == other.microseconds
            && self.extra_ecu == other.extra_ecu
            && self.session_id == other.session_id
            && self.device_timestamp == other.device_timestamp
            && self.big_endian_payload == other.big_endian_payload
            && self.extended == other.extended
            && self.payload == other.payload
    }
}

impl fmt::Display for Message {
    /// Viewer-style one-line rendering.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.6} {} {}", self.storage_timestamp(), self.counter, self.ecu_id)?;
        if let Some(ext) = &self.extended {
            let type_name = ext.message_type().map_or("?", MessageType::name);
            write!(f, " {} {} {} {}", ext.app_id, ext.context_id, type_name, ext.subtype())?;
        }
        match &self.payload {
            Payload::Verbose(arguments) => {
                for argument in arguments {
                    write!(f, " {argument}")?;
                }
                Ok(())
            }
            Payload::NonVerbose(data) => {
                write!(f, " [{}] {} bytes", self.message_id(), data.len())
            }
        }
    }
}

/// Builder for programmatic [`Message`] construction (tests, tooling,
/// encode round trips).
#[derive(Debug, Clone)]
pub struct MessageBuilder {
    version: u8,
    counter: u8,
    ecu_id: ShortId,
    seconds: u32,
    microseconds: i32,
    extra_ecu: Option<ShortId>,
    session_id: Option<u32>,
    device_timestamp: Option<u32>,
    big_endian_payload: bool,
    level: LogLevel,
    app_id: Option<ShortId>,
    context_id: Option<ShortId>,
    msin: Option<u8>,
    payload: Payload,
}

impl Default for MessageBuilder {
    fn default() -> Self {
        Self {
            version: 1,
            counter: 0,
            ecu_id: ShortId::EMPTY,
            seconds: 0,
            microseconds: 0,
            extra_ecu: None,
            session_id: None,
            device_timestamp: None,
            big_endian_payload: false,
            level: LogLevel::Info,
            app_id: None,
            context_id: None,
            msin: None,
            payload: Payload::empty(),
        }
    }
}

impl MessageBuilder {
    /// Standard-header version (defaults to 1).
    pub fn version(mut self, version: u8) -> Self {
        self.version = version;
        self
    }

    /// Producer message counter.
    pub fn counter(mut self, counter: u8) -> Self {
        self.counter = counter;
        self
    }

    /// ECU id for the storage header.
    pub fn ecu_id(mut self, ecu_id: ShortId) -> Self {
        self.ecu_id = ecu_id;
        self
    }

    /// Receive timestamp.
    pub fn timestamp(mut self, seconds: u32, microseconds: i32) -> Self {
        self.seconds = seconds;
        self.microseconds = microseconds;
        self
    }

    /// Repeat the ECU id in the header extra block.
    pub fn extra_ecu(mut self, ecu_id: ShortId) -> Self {
        self.extra_ecu = Some(ecu_id);
        self
    }

    /// Producer session id.
    pub fn session_id(mut self, session_id: u32) -> Self {
        self.session_id = Some(session_id);
        self
    }

    /// Device uptime in 0.1 ms ticks.
    pub fn device_timestamp(mut self, ticks: u32) -> Self {
        self.device_timestamp = Some(ticks);
        self
    }

    /// Encode payload integers big-endian.
    pub fn big_endian_payload(mut self, big_endian: bool) -> Self {
        self.big_endian_payload = big_endian;
        self
    }

    /// Application and context ids (adds an extended header).
    pub fn ids(mut self, app_id: ShortId, context_id: ShortId) -> Self {
        self.app_id = Some(app_id);
        self.context_id = Some(context_id);
        self
    }

    /// Log level (defaults to [`LogLevel::Info`]).
    pub fn level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }

    /// Raw message info byte, overriding the level/type defaults.
    pub fn msin(mut self, msin: u8) -> Self {
        self.msin = Some(msin);
        self
    }

    /// Verbose payload (implies an extended header).
    pub fn verbose(mut self, arguments: Vec<Argument>) -> Self {
        self.payload = Payload::Verbose(arguments);
        self
    }

    /// Convenience: a verbose payload with a single string argument.
    pub fn text(self, text: &str) -> Self {
        self.verbose(vec![Argument::String {
            text: text.to_owned(),
            coding: crate::args::StringCoding::Utf8,
        }])
    }

    /// Non-verbose (opaque) payload.
    pub fn non_verbose(mut self, data: Bytes) -> Self {
        self.payload = Payload::NonVerbose(data);
        self
    }

    /// Finish the message.
    ///
    /// A verbose payload always gets an extended header, with empty ids if
    /// none were supplied; the verbose bit tracks the payload mode.
    pub fn build(self) -> Message {
        let verbose = matches!(self.payload, Payload::Verbose(_));
        let extended = if verbose || self.app_id.is_some() || self.msin.is_some() {
            let app_id = self.app_id.unwrap_or(ShortId::EMPTY);
            let context_id = self.context_id.unwrap_or(ShortId::EMPTY);
            let msin = self.msin.unwrap_or_else(|| {
                ExtendedInfo::log(self.level, verbose, app_id, context_id).msin
            });
            Some(ExtendedInfo { msin, app_id, context_id })
        } else {
            None
        };

        Message {
            version: self.version,
            counter: self.counter,
            ecu_id: self.ecu_id,
            seconds: self.seconds,
            microseconds: self.microseconds,
            extra_ecu: self.extra_ecu,
            session_id: self.session_id,
            device_timestamp: self.device_timestamp,
            big_endian_payload: self.big_endian_payload,
            extended,
            payload: self.payload,
            trailing_bytes: 0,
            raw: Bytes::new(),
        }
    }
}
