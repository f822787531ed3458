pub mod fields;
pub mod page;

use crate::error::FetchError;
use crate::record::{Amount, ExtractedRecord};
use page::Page;

/// Receipt HTML → extracted record. All three fields or an error naming the
/// first one missing.
pub fn extract_record(html: &str) -> Result<ExtractedRecord, FetchError> {
    let page = Page::parse(html);
    let text = page.text();

    let numero = fields::numero(&text).ok_or(FetchError::MissingField("numero"))?;
    let emissao = fields::emissao(&text).ok_or(FetchError::MissingField("emissao"))?;
    let raw_valor = page
        .total_span()
        .or_else(|| fields::valor_pagar(&text))
        .ok_or(FetchError::MissingField("valor_pagar"))?;
    let valor_pagar = raw_valor
        .parse::<Amount>()
        .map_err(|source| FetchError::InvalidAmount {
            raw: raw_valor.clone(),
            source,
        })?;

    Ok(ExtractedRecord {
        numero,
        emissao,
        valor_pagar,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture(name: &str) -> String {
        std::fs::read_to_string(format!("tests/fixtures/{}.html", name)).unwrap()
    }

    #[test]
    fn nfce_with_total_span() {
        let r = extract_record(&fixture("nfce_almoco")).unwrap();
        assert_eq!(r.numero, "123");
        assert_eq!(r.emissao, "05/03/2024 12:41:07");
        assert_eq!(r.valor_pagar.to_string(), "50.00");
    }

    #[test]
    fn nfce_text_fallback() {
        let r = extract_record(&fixture("nfce_hotel")).unwrap();
        assert_eq!(r.numero, "4567");
        assert_eq!(r.emissao, "06/03/2024 21:05:00");
        assert_eq!(r.valor_pagar.to_string(), "1234.56");
    }

    #[test]
    fn missing_emissao() {
        let err = extract_record(&fixture("nfce_incomplete")).unwrap_err();
        assert!(matches!(err, FetchError::MissingField("emissao")));
    }

    #[test]
    fn unrelated_page() {
        let err = extract_record("<html><title>404</title></html>").unwrap_err();
        assert!(matches!(err, FetchError::MissingField("numero")));
    }

    #[test]
    fn garbage_amount() {
        let html = r#"<p>Número: 1 Emissão: 01/01/2024 10:00:00</p><span class="totalNumb txtMax">--</span>"#;
        let err = extract_record(html).unwrap_err();
        assert!(matches!(err, FetchError::InvalidAmount { .. }));
    }
}
