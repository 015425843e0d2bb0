use std::fmt;

use chrono::Datelike;
use serde::Serialize;

/// Calendar month, named by the Portuguese three-letter code used in the base workbook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Month {
    Jan,
    Fev,
    Mar,
    Abr,
    Mai,
    Jun,
    Jul,
    Ago,
    Set,
    Out,
    Nov,
    Dez,
}

/// English `%b` abbreviations to their Portuguese codes.
const ENGLISH_TO_PORTUGUESE: [(&str, Month); 12] = [
    ("jan", Month::Jan),
    ("feb", Month::Fev),
    ("mar", Month::Mar),
    ("apr", Month::Abr),
    ("may", Month::Mai),
    ("jun", Month::Jun),
    ("jul", Month::Jul),
    ("aug", Month::Ago),
    ("sep", Month::Set),
    ("oct", Month::Out),
    ("nov", Month::Nov),
    ("dec", Month::Dez),
];

/// Base-sheet column (0-based) holding January's payments; the other months follow in order.
pub const FIRST_MONTH_COLUMN: u32 = 12;

impl Month {
    pub const ALL: [Month; 12] = [
        Month::Jan,
        Month::Fev,
        Month::Mar,
        Month::Abr,
        Month::Mai,
        Month::Jun,
        Month::Jul,
        Month::Ago,
        Month::Set,
        Month::Out,
        Month::Nov,
        Month::Dez,
    ];

    pub fn code(self) -> &'static str {
        match self {
            Month::Jan => "jan",
            Month::Fev => "fev",
            Month::Mar => "mar",
            Month::Abr => "abr",
            Month::Mai => "mai",
            Month::Jun => "jun",
            Month::Jul => "jul",
            Month::Ago => "ago",
            Month::Set => "set",
            Month::Out => "out",
            Month::Nov => "nov",
            Month::Dez => "dez",
        }
    }

    /// 0-based base-sheet column of this month (jan = 12 ... dez = 23).
    pub fn column(self) -> u32 {
        FIRST_MONTH_COLUMN + self as u32
    }

    pub fn from_english_abbreviation(abbr: &str) -> Option<Month> {
        let abbr = abbr.trim().to_ascii_lowercase();
        ENGLISH_TO_PORTUGUESE
            .iter()
            .find(|(en, _)| *en == abbr)
            .map(|(_, month)| *month)
    }

    /// A month written out in a date string: `jan`, `Fev`, `março`, `September`. The first
    /// three letters are matched against the English abbreviations and the Portuguese codes.
    pub fn from_name(name: &str) -> Option<Month> {
        let name = name.trim().to_lowercase();
        if name.chars().count() < 3 || !name.chars().all(char::is_alphabetic) {
            return None;
        }
        let prefix: String = name.chars().take(3).collect();
        Month::from_english_abbreviation(&prefix)
            .or_else(|| Month::ALL.into_iter().find(|m| m.code() == prefix))
    }

    /// Calendar number (jan = 1).
    pub fn number(self) -> u32 {
        self as u32 + 1
    }

    pub fn from_date(date: &impl Datelike) -> Option<Month> {
        let abbr = chrono::NaiveDate::from_ymd_opt(2000, date.month(), 1)?
            .format("%b")
            .to_string();
        Month::from_english_abbreviation(&abbr)
    }
}

impl fmt::Display for Month {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn columns_span_jan_to_dez() {
        assert_eq!(Month::Jan.column(), 12);
        assert_eq!(Month::Jun.column(), 17);
        assert_eq!(Month::Dez.column(), 23);
        let columns: Vec<u32> = Month::ALL.iter().map(|m| m.column()).collect();
        assert_eq!(columns, (12..=23).collect::<Vec<_>>());
    }

    #[test]
    fn maps_dates_through_english_abbreviations() {
        let date = NaiveDate::from_ymd_opt(2025, 2, 14).unwrap();
        assert_eq!(Month::from_date(&date), Some(Month::Fev));
        let date = NaiveDate::from_ymd_opt(2025, 9, 1).unwrap();
        assert_eq!(Month::from_date(&date), Some(Month::Set));
        assert_eq!(Month::from_english_abbreviation("Dec"), Some(Month::Dez));
        assert_eq!(Month::from_english_abbreviation("dez"), None);
    }

    #[test]
    fn parses_written_month_names() {
        assert_eq!(Month::from_name("jan"), Some(Month::Jan));
        assert_eq!(Month::from_name("Fev"), Some(Month::Fev));
        assert_eq!(Month::from_name("february"), Some(Month::Fev));
        assert_eq!(Month::from_name("março"), Some(Month::Mar));
        assert_eq!(Month::from_name("OUT"), Some(Month::Out));
        assert_eq!(Month::from_name("Sept"), Some(Month::Set));
        assert_eq!(Month::from_name("ja"), None);
        assert_eq!(Month::from_name("Total"), None);
        assert_eq!(Month::Dez.number(), 12);
    }

    #[test]
    fn codes_are_portuguese() {
        let codes: Vec<&str> = Month::ALL.iter().map(|m| m.code()).collect();
        assert_eq!(
            codes,
            ["jan", "fev", "mar", "abr", "mai", "jun", "jul", "ago", "set", "out", "nov", "dez"]
        );
    }
}
