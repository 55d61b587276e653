use std::collections::BTreeSet;

use serde::Deserialize;

use crate::error::SymbolsError;

/// Документ со списком символов, который producer берёт из object store:
/// `{"symbols": ["MSFT", "AMZN"]}`
#[derive(Debug, Clone, Deserialize)]
pub struct SymbolsDocument {
    pub symbols: Vec<String>,
}

/// Символ в том виде, в каком он уходит в market-data API и в partition key:
/// без пробелов по краям, ASCII uppercase. Пустые отбрасываются, результат
/// отсортирован и без повторов.
pub fn normalize_symbols<I, S>(items: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    items
        .into_iter()
        .filter_map(|s| {
            let s = s.as_ref().trim();
            (!s.is_empty()).then(|| s.to_ascii_uppercase())
        })
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Список из аргумента или переменной окружения: `"MSFT, AMZN"`.
pub fn parse_symbols_csv(raw: &str) -> Vec<String> {
    normalize_symbols(raw.split(','))
}

/// Только `SymbolsDocument`; так отвечает object store.
pub fn parse_symbols_document(raw: &[u8]) -> Result<Vec<String>, SymbolsError> {
    let doc: SymbolsDocument = serde_json::from_slice(raw)?;
    Ok(normalize_symbols(&doc.symbols))
}

/// Локальный файл со списком: JSON-объект читается как `SymbolsDocument`,
/// всё остальное как watchlist (символы через запятую или по строкам,
/// `#` до конца строки комментарий).
pub fn parse_symbols(raw: &[u8]) -> Result<Vec<String>, SymbolsError> {
    let text = std::str::from_utf8(raw)?;
    if text.trim_start().starts_with('{') {
        return parse_symbols_document(raw);
    }

    let entries = text
        .lines()
        .map(|line| line.split_once('#').map_or(line, |(before, _)| before))
        .flat_map(|line| line.split(','));
    Ok(normalize_symbols(entries))
}
