//! Frame decode/encode.
//!
//! [`decode`] turns exactly one frame into a [`Message`]; [`encode`] is the
//! exact inverse for representable messages, so
//! `decode(&encode(&m, &p)?, &p)? == m` holds and re-encoding a decoded
//! frame reproduces its bytes.

use bytes::{BufMut, Bytes, BytesMut};

use crate::args::Argument;
use crate::errors::{DecodeError, EncodeError};
use crate::flags::{join_htyp, split_htyp, HeaderFlags, MAX_VERSION};
use crate::header::{ExtendedHeader, StandardHeader, StorageHeader};
use crate::ident::ShortId;
use crate::message::{ExtendedInfo, Message, Payload};
use crate::profile::DecodingProfile;

/// Decode one complete frame.
///
/// `raw` must hold exactly the frame: resynchronization and boundary
/// detection happen upstream in the stream scanner. Decoding is pure (the
/// profile is the only input besides the bytes) and the input buffer is
/// retained verbatim on the returned message.
pub fn decode(raw: &[u8], profile: &DecodingProfile) -> Result<Message, DecodeError> {
    let storage = StorageHeader::read(raw).ok_or(DecodeError::TruncatedFrame {
        needed: DecodingProfile::MIN_FRAME_LEN,
        available: raw.len(),
    })?;
    if storage.pattern != profile.storage_pattern {
        return Err(DecodeError::BadPattern { found: storage.pattern });
    }

    let standard =
        StandardHeader::read(&raw[StorageHeader::SIZE..]).ok_or(DecodeError::TruncatedFrame {
            needed: DecodingProfile::MIN_FRAME_LEN,
            available: raw.len(),
        })?;
    let (header_flags, version) = split_htyp(standard.htyp);
    if version != profile.version {
        return Err(DecodeError::UnknownVersion { version });
    }

    let declared = StorageHeader::SIZE + standard.len.get() as usize;
    if raw.len() < declared {
        return Err(DecodeError::TruncatedFrame { needed: declared, available: raw.len() });
    }
    if raw.len() > declared {
        return Err(DecodeError::LengthMismatch { declared, actual: raw.len() });
    }

    let mut body = &raw[StorageHeader::SIZE + StandardHeader::SIZE..declared];

    let extra_ecu = if header_flags.contains(HeaderFlags::WITH_ECU) {
        Some(ShortId::from_bytes(take_id(&mut body, declared, raw.len())?))
    } else {
        None
    };
    let session_id = if header_flags.contains(HeaderFlags::WITH_SESSION) {
        Some(take_u32(&mut body, declared, raw.len())?)
    } else {
        None
    };
    let device_timestamp = if header_flags.contains(HeaderFlags::WITH_TIMESTAMP) {
        Some(take_u32(&mut body, declared, raw.len())?)
    } else {
        None
    };

    let extended = if header_flags.contains(HeaderFlags::EXTENDED) {
        let header = ExtendedHeader::read(body).ok_or(DecodeError::TruncatedFrame {
            needed: declared + ExtendedHeader::SIZE - body.len(),
            available: raw.len(),
        })?;
        body = &body[ExtendedHeader::SIZE..];
        Some((
            ExtendedInfo {
                msin: header.msin,
                app_id: ShortId::from_bytes(header.apid),
                context_id: ShortId::from_bytes(header.ctid),
            },
            header.noar,
        ))
    } else {
        None
    };

    let big_endian_payload = header_flags.contains(HeaderFlags::BIG_ENDIAN);
    let verbose = extended.as_ref().is_some_and(|(info, _)| info.verbose());

    let (payload, trailing_bytes) = if verbose {
        let argument_count = extended.as_ref().map_or(0, |(_, noar)| *noar);
        let mut arguments = Vec::with_capacity(usize::from(argument_count));
        let mut offset = 0;
        for index in 0..usize::from(argument_count) {
            let (argument, consumed) = Argument::decode(&body[offset..], big_endian_payload)
                .map_err(|source| DecodeError::MalformedArgument { index, source })?;
            arguments.push(argument);
            offset += consumed;
        }
        // Leftovers after the declared argument count are recorded, not
        // fatal.
        (Payload::Verbose(arguments), body.len() - offset)
    } else {
        (Payload::NonVerbose(Bytes::copy_from_slice(body)), 0)
    };

    Ok(Message {
        version,
        counter: standard.mcnt,
        ecu_id: ShortId::from_bytes(storage.ecu),
        seconds: storage.seconds.get(),
        microseconds: storage.microseconds.get(),
        extra_ecu,
        session_id,
        device_timestamp,
        big_endian_payload,
        extended: extended.map(|(info, _)| info),
        payload,
        trailing_bytes,
        raw: Bytes::copy_from_slice(raw),
    })
}

/// Encode a message back into a wire frame.
///
/// Fails only for messages the wire format cannot represent (oversized
/// payloads or arguments, out-of-range version).
pub fn encode(message: &Message, profile: &DecodingProfile) -> Result<Bytes, EncodeError> {
    if message.version() > MAX_VERSION {
        return Err(EncodeError::VersionOutOfRange { version: message.version() });
    }

    let mut payload = BytesMut::new();
    let argument_count = match message.payload() {
        Payload::Verbose(arguments) => {
            if message.extended().is_none() {
                return Err(EncodeError::MissingExtendedHeader);
            }
            let count = u8::try_from(arguments.len())
                .map_err(|_| EncodeError::TooManyArguments { count: arguments.len() })?;
            for argument in arguments {
                argument.encode(&mut payload, message.big_endian_payload())?;
            }
            count
        }
        Payload::NonVerbose(data) => {
            payload.put_slice(data);
            0
        }
    };

    let mut flags = HeaderFlags::empty();
    flags.set(HeaderFlags::BIG_ENDIAN, message.big_endian_payload());
    flags.set(HeaderFlags::WITH_ECU, message.extra_ecu().is_some());
    flags.set(HeaderFlags::WITH_SESSION, message.session_id().is_some());
    flags.set(HeaderFlags::WITH_TIMESTAMP, message.device_timestamp().is_some());
    flags.set(HeaderFlags::EXTENDED, message.extended().is_some());

    let extra_len = message.extra_ecu().map_or(0, |_| 4)
        + message.session_id().map_or(0, |_| 4)
        + message.device_timestamp().map_or(0, |_| 4);
    let extended_len = message.extended().map_or(0, |_| ExtendedHeader::SIZE);
    let len = StandardHeader::SIZE + extra_len + extended_len + payload.len();
    let declared = u16::try_from(len).map_err(|_| EncodeError::FrameTooLarge { len })?;

    let mut out = BytesMut::with_capacity(StorageHeader::SIZE + len);

    let storage = StorageHeader {
        pattern: profile.storage_pattern,
        seconds: message.timestamp_seconds().into(),
        microseconds: message.timestamp_microseconds().into(),
        ecu: *message.ecu_id().as_bytes(),
    };
    out.put_slice(zerocopy::IntoBytes::as_bytes(&storage));

    let standard = StandardHeader {
        htyp: join_htyp(flags, message.version()),
        mcnt: message.counter(),
        len: declared.into(),
    };
    out.put_slice(zerocopy::IntoBytes::as_bytes(&standard));

    if let Some(ecu) = message.extra_ecu() {
        out.put_slice(ecu.as_bytes());
    }
    if let Some(session) = message.session_id() {
        out.put_u32(session);
    }
    if let Some(ticks) = message.device_timestamp() {
        out.put_u32(ticks);
    }

    if let Some(info) = message.extended() {
        let extended = ExtendedHeader {
            msin: info.msin,
            noar: argument_count,
            apid: *info.app_id.as_bytes(),
            ctid: *info.context_id.as_bytes(),
        };
        out.put_slice(zerocopy::IntoBytes::as_bytes(&extended));
    }

    out.put_slice(&payload);
    Ok(out.freeze())
}

fn take_id(body: &mut &[u8], declared: usize, available: usize) -> Result<[u8; 4], DecodeError> {
    let bytes: [u8; 4] = body
        .get(..4)
        .and_then(|slice| slice.try_into().ok())
        .ok_or(DecodeError::TruncatedFrame { needed: declared, available })?;
    *body = &body[4..];
    Ok(bytes)
}

fn take_u32(body: &mut &[u8], declared: usize, available: usize) -> Result<u32, DecodeError> {
    // Header-extra integers are big-endian regardless of the payload order.
    take_id(body, declared, available).map(u32::from_be_bytes)
}
