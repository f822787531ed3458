use std::sync::LazyLock;

use regex::Regex;

static NUMERO_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)N[uú]mero\s*:?\s*(\d+)").unwrap());
static EMISSAO_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)Emiss(?:ão|ao)\s*:?\s*(\d{2}/\d{2}/\d{4}\s+\d{2}:\d{2}:\d{2})").unwrap()
});
static VALOR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)Valor\s*a\s*pagar\s*R\$\s*:?\s*([0-9.,]+)").unwrap());

pub fn numero(text: &str) -> Option<String> {
    NUMERO_RE.captures(text).map(|c| c[1].to_string())
}

pub fn emissao(text: &str) -> Option<String> {
    EMISSAO_RE.captures(text).map(|c| c[1].to_string())
}

/// "Valor a pagar R$: 52,30" fallback when the page has no total span.
pub fn valor_pagar(text: &str) -> Option<String> {
    VALOR_RE
        .captures(text)
        .map(|c| c[1].trim_end_matches(['.', ',']).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numero_with_and_without_accent() {
        assert_eq!(numero("Série: 1 Número: 000123 Emissão").as_deref(), Some("000123"));
        assert_eq!(numero("NUMERO 77").as_deref(), Some("77"));
        assert_eq!(numero("Nº 77"), None);
    }

    #[test]
    fn emissao_requires_time() {
        assert_eq!(
            emissao("Emissão: 05/03/2024 12:41:07-03:00 - Via Consumidor").as_deref(),
            Some("05/03/2024 12:41:07")
        );
        assert_eq!(emissao("Emissao 05/03/2024"), None);
    }

    #[test]
    fn valor_pagar_pattern() {
        assert_eq!(
            valor_pagar("Valor total R$: 60,00 Valor a pagar R$: 52,30 Forma").as_deref(),
            Some("52,30")
        );
        assert_eq!(valor_pagar("Valor a pagar R$ 1.052,30.").as_deref(), Some("1.052,30"));
        assert_eq!(valor_pagar("Total: 10"), None);
    }
}
