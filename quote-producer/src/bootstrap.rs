use std::path::{Path, PathBuf};

use log::info;
use reqwest::blocking::Client;
use stream_core::PipelineError;
use stream_core::symbols::{parse_symbols, parse_symbols_csv, parse_symbols_document};

/// Откуда взять список символов при старте.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum SymbolSource {
    /// "MSFT, AMZN"
    Inline(String),
    /// Документ `{"symbols": [...]}` или watchlist по строкам
    File(PathBuf),
    /// URL документа `{"symbols": [...]}` в объектном хранилище
    Url(String),
}

/// Любая ошибка здесь фатальна для запуска: `ConfigUnavailable`.
pub(crate) fn load_symbols(source: &SymbolSource, http: &Client) -> Result<Vec<String>, PipelineError> {
    let symbols = match source {
        SymbolSource::Inline(raw) => parse_symbols_csv(raw),
        SymbolSource::File(path) => load_from_file(path)?,
        SymbolSource::Url(url) => load_from_url(url, http)?,
    };

    if symbols.is_empty() {
        return Err(PipelineError::ConfigUnavailable(format!(
            "symbol list from {source:?} is empty"
        )));
    }

    info!("action=load_symbols count={} symbols={}", symbols.len(), symbols.join(","));
    Ok(symbols)
}

fn load_from_file(path: &Path) -> Result<Vec<String>, PipelineError> {
    let unavailable = |e: &dyn std::fmt::Display| {
        PipelineError::ConfigUnavailable(format!("symbols file {}: {e}", path.display()))
    };

    let raw = std::fs::read(path).map_err(|e| unavailable(&e))?;
    parse_symbols(&raw).map_err(|e| unavailable(&e))
}

fn load_from_url(url: &str, http: &Client) -> Result<Vec<String>, PipelineError> {
    let unavailable =
        |e: &dyn std::fmt::Display| PipelineError::ConfigUnavailable(format!("symbols document {url}: {e}"));

    let body = http
        .get(url)
        .send()
        .and_then(|r| r.error_for_status())
        .and_then(|r| r.bytes())
        .map_err(|e| unavailable(&e))?;

    parse_symbols_document(&body).map_err(|e| unavailable(&e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use std::io::Write;

    #[test]
    fn inline_list_is_normalized() {
        let src = SymbolSource::Inline("msft, amzn ,MSFT".into());
        let symbols = load_symbols(&src, &Client::new()).unwrap();
        assert_eq!(symbols, vec!["AMZN".to_string(), "MSFT".to_string()]);
    }

    #[test]
    fn json_file_document() {
        let mut f = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        f.write_all(br#"{"symbols": ["MSFT", "AMZN"]}"#).unwrap();

        let symbols = load_symbols(&SymbolSource::File(f.path().to_path_buf()), &Client::new()).unwrap();
        assert_eq!(symbols, vec!["AMZN".to_string(), "MSFT".to_string()]);
    }

    #[test]
    fn plain_file_one_symbol_per_line() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "# watchlist\nmsft\n\ngoog").unwrap();

        let symbols = load_symbols(&SymbolSource::File(f.path().to_path_buf()), &Client::new()).unwrap();
        assert_eq!(symbols, vec!["GOOG".to_string(), "MSFT".to_string()]);
    }

    #[test]
    fn broken_document_file_is_config_unavailable() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(br#"{"symbols": "MSFT"}"#).unwrap();

        let err = load_symbols(&SymbolSource::File(f.path().to_path_buf()), &Client::new()).unwrap_err();
        assert!(matches!(err, PipelineError::ConfigUnavailable(_)));
    }

    #[test]
    fn missing_file_is_config_unavailable() {
        let src = SymbolSource::File(PathBuf::from("/definitely/not/here.json"));
        assert!(matches!(
            load_symbols(&src, &Client::new()).unwrap_err(),
            PipelineError::ConfigUnavailable(_)
        ));
    }

    #[test]
    fn document_from_url() {
        let server = MockServer::start();
        let m = server.mock(|when, then| {
            when.method(GET).path("/config/symbols.json");
            then.status(200).body(r#"{"symbols": ["TSLA", "AAPL"]}"#);
        });

        let src = SymbolSource::Url(server.url("/config/symbols.json"));
        let symbols = load_symbols(&src, &Client::new()).unwrap();

        m.assert();
        assert_eq!(symbols, vec!["AAPL".to_string(), "TSLA".to_string()]);
    }

    #[test]
    fn url_not_found_or_bad_document_is_config_unavailable() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/missing");
            then.status(404);
        });
        server.mock(|when, then| {
            when.method(GET).path("/bad");
            then.status(200).body("not json");
        });

        for path in ["/missing", "/bad"] {
            let src = SymbolSource::Url(server.url(path));
            assert!(matches!(
                load_symbols(&src, &Client::new()).unwrap_err(),
                PipelineError::ConfigUnavailable(_)
            ));
        }
    }

    #[test]
    fn empty_list_is_config_unavailable() {
        let src = SymbolSource::Inline(" , ".into());
        assert!(matches!(
            load_symbols(&src, &Client::new()).unwrap_err(),
            PipelineError::ConfigUnavailable(_)
        ));
    }
}
