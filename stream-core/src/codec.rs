use crate::error::CodecError;
use crate::types::{StreamEvent, StreamRecord};

/// JSON с тегом `kind`: самоописываемый и детерминированный
/// (порядок полей фиксирован структурами).
pub fn encode(event: &StreamEvent) -> Result<Vec<u8>, CodecError> {
    serde_json::to_vec(event).map_err(CodecError::Encode)
}

pub fn decode(payload: &[u8]) -> Result<StreamEvent, CodecError> {
    serde_json::from_slice(payload).map_err(CodecError::MalformedPayload)
}

/// Запись для стрима: partition key равен символу события.
pub fn to_stream_record(event: &StreamEvent) -> Result<StreamRecord, CodecError> {
    Ok(StreamRecord {
        partition_key: event.symbol().to_string(),
        payload: encode(event)?,
    })
}

/// Порядок входа сохраняется, ключ у каждой записи свой.
pub fn to_stream_records<'a, I>(events: I) -> Result<Vec<StreamRecord>, CodecError>
where
    I: IntoIterator<Item = &'a StreamEvent>,
{
    events.into_iter().map(to_stream_record).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{HistoryPoint, QuoteRecord};

    fn mk_quote(symbol: &str, current: f64) -> QuoteRecord {
        QuoteRecord {
            symbol: symbol.to_string(),
            short_name: format!("{symbol} Inc."),
            market_time: 1_614_000_000,
            quote_source: "Nasdaq Real Time Price".to_string(),
            current,
            low_day: 246.88,
            high_day: 249.4,
            open: 247.1,
            previous_close: 245.03,
            low_52wk: 132.52,
            high_52wk: 246.13,
        }
    }

    #[test]
    fn quote_round_trip_is_identity() {
        let ev = StreamEvent::Quote(mk_quote("MSFT", 0.1 + 0.2));
        let bytes = encode(&ev).unwrap();
        assert_eq!(decode(&bytes).unwrap(), ev);
    }

    #[test]
    fn history_round_trip_is_identity() {
        let ev = StreamEvent::History(HistoryPoint::new(
            "AMZN".to_string(),
            1_614_000_300,
            3217.06,
            3247.31,
            3220.0,
            3240.5,
        ));
        let bytes = encode(&ev).unwrap();
        assert_eq!(decode(&bytes).unwrap(), ev);
    }

    #[test]
    fn encode_is_deterministic_and_tagged() {
        let ev = StreamEvent::Quote(mk_quote("MSFT", 1.5));
        let a = encode(&ev).unwrap();
        let b = encode(&ev).unwrap();
        assert_eq!(a, b);

        let text = String::from_utf8(a).unwrap();
        assert!(text.starts_with(r#"{"kind":"quote","symbol":"MSFT""#), "{text}");
    }

    #[test]
    fn decode_rejects_garbage() {
        let err = decode(b"\x00\x01not json").unwrap_err();
        assert!(matches!(err, CodecError::MalformedPayload(_)));
    }

    #[test]
    fn decode_rejects_json_missing_fields() {
        let err = decode(br#"{"kind":"quote","symbol":"MSFT"}"#).unwrap_err();
        assert!(matches!(err, CodecError::MalformedPayload(_)));
    }

    #[test]
    fn decode_rejects_unknown_kind() {
        let err = decode(br#"{"kind":"trade","symbol":"MSFT"}"#).unwrap_err();
        assert!(matches!(err, CodecError::MalformedPayload(_)));
    }

    #[test]
    fn encode_fails_on_non_finite_price() {
        let ev = StreamEvent::Quote(mk_quote("MSFT", f64::NAN));
        // serde_json пишет NaN как null, а обратно null в f64 не читается
        match encode(&ev) {
            Ok(bytes) => assert!(decode(&bytes).is_err()),
            Err(e) => assert!(matches!(e, CodecError::Encode(_))),
        }
    }

    #[test]
    fn stream_records_keep_order_and_use_own_symbol_as_key() {
        let events: Vec<StreamEvent> = ["MSFT", "AMZN", "MSFT"]
            .into_iter()
            .enumerate()
            .map(|(i, s)| StreamEvent::Quote(mk_quote(s, i as f64)))
            .collect();

        let records = to_stream_records(&events).unwrap();

        let keys: Vec<&str> = records.iter().map(|r| r.partition_key.as_str()).collect();
        assert_eq!(keys, vec!["MSFT", "AMZN", "MSFT"]);

        for (rec, ev) in records.iter().zip(&events) {
            assert_eq!(&decode(&rec.payload).unwrap(), ev);
        }
    }
}
