use std::io::{self, Read, Write};

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::WireError;

pub const WIRE_VERSION: u8 = 1;

/// Ограничение на тело фрейма: 500 записей по ~1 KiB с запасом
pub const MAX_FRAME_LEN: usize = 8 * 1024 * 1024;

// сколько таймаутов подряд терпим посреди начатого фрейма
const MAX_STALLED_READS: usize = 25;

/// Фрейм: `[len: u32 BE][version][postcard body]`, len считает version + body.
pub fn encode_frame<T: Serialize>(msg: &T) -> Result<Vec<u8>, WireError> {
    let body = postcard::to_allocvec(msg)?;
    let len = body.len() + 1;
    if len > MAX_FRAME_LEN {
        return Err(WireError::FrameTooLarge(len));
    }

    let mut out = Vec::with_capacity(4 + len);
    out.extend_from_slice(&(len as u32).to_be_bytes());
    out.push(WIRE_VERSION);
    out.extend_from_slice(&body);
    Ok(out)
}

/// Разбор содержимого фрейма (без префикса длины).
pub fn decode_body<T: DeserializeOwned>(buf: &[u8]) -> Result<T, WireError> {
    let (&ver, payload) = buf.split_first().ok_or(WireError::FrameTooShort)?;
    if ver != WIRE_VERSION {
        return Err(WireError::UnsupportedWireVersion(ver));
    }
    Ok(postcard::from_bytes(payload)?)
}

pub fn write_frame<W: Write, T: Serialize>(w: &mut W, msg: &T) -> Result<(), WireError> {
    let bytes = encode_frame(msg)?;
    w.write_all(&bytes)?;
    w.flush()?;
    Ok(())
}

/// Читает один фрейм. `Ok(None)`: собеседник аккуратно закрыл соединение
/// до начала фрейма.
///
/// Таймаут чтения (`WouldBlock`/`TimedOut`) всплывает как `WireError::Io`
/// только пока не получено ни одного байта фрейма; начатый фрейм дочитывается.
pub fn read_frame<R: Read, T: DeserializeOwned>(r: &mut R) -> Result<Option<T>, WireError> {
    let mut len_buf = [0u8; 4];
    match read_exact_or_eof(r, &mut len_buf, true)? {
        ReadStatus::Eof => return Ok(None),
        ReadStatus::Filled => {}
    }

    let len = u32::from_be_bytes(len_buf) as usize;
    if len == 0 {
        return Err(WireError::FrameTooShort);
    }
    if len > MAX_FRAME_LEN {
        return Err(WireError::FrameTooLarge(len));
    }

    let mut body = vec![0u8; len];
    match read_exact_or_eof(r, &mut body, false)? {
        ReadStatus::Eof => Err(WireError::FrameTooShort),
        ReadStatus::Filled => decode_body(&body).map(Some),
    }
}

enum ReadStatus {
    Filled,
    Eof,
}

// EOF до первого байта значит штатное закрытие, EOF в середине фрейма значит обрыв
fn read_exact_or_eof<R: Read>(
    r: &mut R,
    buf: &mut [u8],
    frame_start: bool,
) -> Result<ReadStatus, WireError> {
    let mut filled = 0;
    let mut stalled = 0;
    while filled < buf.len() {
        match r.read(&mut buf[filled..]) {
            Ok(0) if filled == 0 && frame_start => return Ok(ReadStatus::Eof),
            Ok(0) => return Err(WireError::FrameTooShort),
            Ok(n) => {
                filled += n;
                stalled = 0;
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) if is_timeout(&e) && !(filled == 0 && frame_start) => {
                stalled += 1;
                if stalled >= MAX_STALLED_READS {
                    return Err(e.into());
                }
            }
            Err(e) => return Err(e.into()),
        }
    }
    Ok(ReadStatus::Filled)
}

pub fn is_timeout(e: &io::Error) -> bool {
    matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Request;
    use std::io::Cursor;

    #[test]
    fn frames_can_be_read_back_in_sequence() {
        let mut buf = Vec::new();
        write_frame(&mut buf, &Request::ListShards { stream: "quotes".into() }).unwrap();
        write_frame(&mut buf, &Request::DescribeStream { stream: "other".into() }).unwrap();

        let mut r = Cursor::new(buf);
        let a: Request = read_frame(&mut r).unwrap().unwrap();
        let b: Request = read_frame(&mut r).unwrap().unwrap();
        let end: Option<Request> = read_frame(&mut r).unwrap();

        assert_eq!(a, Request::ListShards { stream: "quotes".into() });
        assert_eq!(b, Request::DescribeStream { stream: "other".into() });
        assert!(end.is_none());
    }

    #[test]
    fn truncated_frame_is_an_error() {
        let mut bytes = encode_frame(&Request::ListShards { stream: "quotes".into() }).unwrap();
        bytes.truncate(bytes.len() - 2);

        let err = read_frame::<_, Request>(&mut Cursor::new(bytes)).unwrap_err();
        assert!(matches!(err, WireError::FrameTooShort));
    }

    #[test]
    fn wrong_version_is_rejected() {
        let mut bytes = encode_frame(&Request::ListShards { stream: "quotes".into() }).unwrap();
        bytes[4] = WIRE_VERSION + 1;

        let err = read_frame::<_, Request>(&mut Cursor::new(bytes)).unwrap_err();
        assert!(matches!(err, WireError::UnsupportedWireVersion(v) if v == WIRE_VERSION + 1));
    }

    #[test]
    fn oversized_length_prefix_is_rejected_without_allocating() {
        let bytes = u32::MAX.to_be_bytes().to_vec();
        let err = read_frame::<_, Request>(&mut Cursor::new(bytes)).unwrap_err();
        assert!(matches!(err, WireError::FrameTooLarge(_)));
    }

    #[test]
    fn empty_body_is_too_short() {
        assert!(matches!(
            decode_body::<Request>(&[]).unwrap_err(),
            WireError::FrameTooShort
        ));
    }
}
