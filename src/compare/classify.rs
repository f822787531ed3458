use std::fmt;
use std::sync::LazyLock;

use chrono::{NaiveDateTime, Timelike};
use regex::Regex;

use crate::record::Amount;

static HOUR_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\d{2}):(\d{2})").unwrap());

const HOTEL_ABOVE: Amount = Amount::from_cents(100_00);
const MEAL_MIN: Amount = Amount::from_cents(40_00);
const MEAL_MAX: Amount = Amount::from_cents(55_00);
const DINNER_FROM_HOUR: u32 = 16;

pub const NOTE_CHECK_HOUR: &str = "VERIFICAR_HORARIO";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Label {
    Almoco,
    Janta,
    Hotel,
    Outro,
    SemValor,
    NaoEncontrado,
    Erro,
}

impl Label {
    pub const ALL: [Label; 7] = [
        Label::Almoco,
        Label::Janta,
        Label::Hotel,
        Label::Outro,
        Label::SemValor,
        Label::NaoEncontrado,
        Label::Erro,
    ];

    pub fn from_name(name: &str) -> Option<Label> {
        Label::ALL.into_iter().find(|l| l.as_str() == name)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Label::Almoco => "ALMOCO",
            Label::Janta => "JANTA",
            Label::Hotel => "HOTEL",
            Label::Outro => "OUTRO",
            Label::SemValor => "SEM_VALOR",
            Label::NaoEncontrado => "NAO_ENCONTRADO",
            Label::Erro => "ERRO",
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whole-word keywords, matched after lowercasing and dropping accents.
const KEYWORDS: &[(&str, Label)] = &[
    ("almoco", Label::Almoco),
    ("almocos", Label::Almoco),
    ("lunch", Label::Almoco),
    ("refeicao", Label::Almoco),
    ("janta", Label::Janta),
    ("jantar", Label::Janta),
    ("dinner", Label::Janta),
    ("hotel", Label::Hotel),
    ("hospedagem", Label::Hotel),
    ("pousada", Label::Hotel),
    ("diaria", Label::Hotel),
    ("diarias", Label::Hotel),
];

/// Label for a matched reference row, plus an optional review note.
///
/// The reference description wins when it names a category; otherwise the
/// receipt's amount and issue time decide.
pub fn classify(description: Option<&str>, amount: Option<Amount>, emissao: &str) -> (Label, Option<&'static str>) {
    if let Some(label) = description.and_then(keyword_label) {
        return (label, None);
    }

    let Some(amount) = amount else {
        return (Label::SemValor, None);
    };
    if amount > HOTEL_ABOVE {
        return (Label::Hotel, None);
    }
    if (MEAL_MIN..=MEAL_MAX).contains(&amount) {
        return match issue_hour(emissao) {
            Some(h) if h < DINNER_FROM_HOUR => (Label::Almoco, None),
            Some(_) => (Label::Janta, None),
            None => (Label::Almoco, Some(NOTE_CHECK_HOUR)),
        };
    }
    (Label::Outro, None)
}

pub fn keyword_label(description: &str) -> Option<Label> {
    let folded = fold(description);
    folded
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .find_map(|w| KEYWORDS.iter().find(|(k, _)| *k == w).map(|(_, l)| *l))
}

fn issue_hour(emissao: &str) -> Option<u32> {
    let s = emissao.trim();
    if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%d/%m/%Y %H:%M:%S") {
        return Some(dt.hour());
    }
    HOUR_RE
        .captures(s)
        .and_then(|c| c[1].parse::<u32>().ok())
        .filter(|h| *h < 24)
}

fn fold(s: &str) -> String {
    s.chars()
        .flat_map(char::to_lowercase)
        .map(|c| match c {
            'á' | 'à' | 'â' | 'ã' | 'ä' => 'a',
            'é' | 'è' | 'ê' | 'ë' => 'e',
            'í' | 'ì' | 'î' | 'ï' => 'i',
            'ó' | 'ò' | 'ô' | 'õ' | 'ö' => 'o',
            'ú' | 'ù' | 'û' | 'ü' => 'u',
            'ç' => 'c',
            other => other,
        })
        .collect()
}
