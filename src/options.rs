// Print settings chosen on the command line and the `MetaData` JSON the
// server expects alongside the uploaded document.

use clap::ValueEnum;
use serde::Serialize;
use std::fmt;

/// Full color or black and white.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum ColorMode {
    #[default]
    Full,
    Mono,
}

/// Single or double sided.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum Sides {
    #[default]
    #[value(name = "1", alias = "simplex")]
    Simplex,
    #[value(name = "2", alias = "duplex")]
    Duplex,
}

impl Sides {
    pub fn count(self) -> u8 {
        match self {
            Sides::Simplex => 1,
            Sides::Duplex => 2,
        }
    }

    pub fn from_count(count: i64) -> Option<Self> {
        match count {
            1 => Some(Sides::Simplex),
            2 => Some(Sides::Duplex),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PagesPerSide {
    #[default]
    One,
    Two,
}

impl PagesPerSide {
    fn as_wire(self) -> &'static str {
        match self {
            PagesPerSide::One => "1",
            PagesPerSide::Two => "2",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum PageSize {
    #[default]
    Letter,
    Legal,
    A4,
}

impl PageSize {
    fn as_wire(self) -> &'static str {
        match self {
            PageSize::Letter => "Letter",
            PageSize::Legal => "Legal",
            PageSize::A4 => "A4",
        }
    }
}

/// Everything the user can choose about how a document prints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrintOptions {
    pub color: ColorMode,
    pub sides: Sides,
    pub pages_per_side: PagesPerSide,
    pub copies: u32,
    /// Empty means every page.
    pub page_range: String,
    pub page_size: PageSize,
}

impl Default for PrintOptions {
    fn default() -> Self {
        PrintOptions {
            color: ColorMode::Full,
            sides: Sides::Simplex,
            pages_per_side: PagesPerSide::One,
            copies: 1,
            page_range: String::new(),
            page_size: PageSize::Letter,
        }
    }
}

/// Envelope posted as the `MetaData` multipart field.
#[derive(Debug, Serialize)]
pub struct MetaData<'a> {
    #[serde(rename = "FinishingOptions")]
    pub finishing_options: FinishingOptions<'a>,
    /// Always null: the print queue picks the printer at release time.
    #[serde(rename = "PrinterName")]
    pub printer_name: Option<&'a str>,
}

/// Numbers go over the wire as strings, the way the web client sends them.
#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct FinishingOptions<'a> {
    pub mono: bool,
    pub duplex: bool,
    pub pages_per_side: &'static str,
    pub copies: String,
    pub page_range: &'a str,
    pub default_page_size: &'static str,
}

impl PrintOptions {
    pub fn metadata(&self) -> MetaData<'_> {
        MetaData {
            finishing_options: FinishingOptions {
                mono: self.color == ColorMode::Mono,
                duplex: self.sides == Sides::Duplex,
                pages_per_side: self.pages_per_side.as_wire(),
                copies: self.copies.to_string(),
                page_range: self.page_range.trim(),
                default_page_size: self.page_size.as_wire(),
            },
            printer_name: None,
        }
    }

    /// Serialized `MetaData` part body.
    pub fn metadata_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.metadata())
    }
}

/// Human-readable summary lines, one per setting.
impl fmt::Display for PrintOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.color {
            ColorMode::Full => writeln!(f, "  - Full color")?,
            ColorMode::Mono => writeln!(f, "  - Mono")?,
        }
        match self.sides {
            Sides::Simplex => writeln!(f, "  - Simplex")?,
            Sides::Duplex => writeln!(f, "  - Duplex")?,
        }
        if self.pages_per_side == PagesPerSide::Two {
            writeln!(f, "  - 2 pages per side")?;
        }
        writeln!(f, "  - Copies: {}", self.copies)?;
        if self.page_range.trim().is_empty() {
            writeln!(f, "  - Page range: all")?;
        } else {
            writeln!(f, "  - Page range: {}", self.page_range.trim())?;
        }
        write!(f, "  - Page size: {}", self.page_size.as_wire())
    }
}

/// Check a page range such as `1-5, 8, 11-13`. Used as a clap value parser.
pub fn parse_page_range(input: &str) -> Result<String, String> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Ok(String::new());
    }
    for item in trimmed.split(',') {
        let item = item.trim();
        let (start, end) = match item.split_once('-') {
            Some((a, b)) => (a.trim(), b.trim()),
            None => (item, item),
        };
        let start: u32 = start
            .parse()
            .map_err(|_| format!("invalid page number in '{}'", item))?;
        let end: u32 = end
            .parse()
            .map_err(|_| format!("invalid page number in '{}'", item))?;
        if start == 0 || end < start {
            return Err(format!("invalid page span '{}'", item));
        }
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_options_metadata_matches_web_client() {
        let json = PrintOptions::default().metadata_json().unwrap();
        assert_eq!(
            json,
            r#"{"FinishingOptions":{"Mono":false,"Duplex":false,"PagesPerSide":"1","Copies":"1","PageRange":"","DefaultPageSize":"Letter"},"PrinterName":null}"#
        );
    }

    #[test]
    fn custom_options_metadata() {
        let options = PrintOptions {
            color: ColorMode::Mono,
            sides: Sides::Duplex,
            pages_per_side: PagesPerSide::Two,
            copies: 3,
            page_range: " 1-5, 8 ".into(),
            page_size: PageSize::A4,
        };
        let value: serde_json::Value = serde_json::from_str(&options.metadata_json().unwrap()).unwrap();
        let finishing = &value["FinishingOptions"];
        assert_eq!(finishing["Mono"], true);
        assert_eq!(finishing["Duplex"], true);
        assert_eq!(finishing["PagesPerSide"], "2");
        assert_eq!(finishing["Copies"], "3");
        assert_eq!(finishing["PageRange"], "1-5, 8");
        assert_eq!(finishing["DefaultPageSize"], "A4");
        assert!(value["PrinterName"].is_null());
    }

    #[test]
    fn page_ranges() {
        assert_eq!(parse_page_range("1-5, 8, 11-13").unwrap(), "1-5, 8, 11-13");
        assert_eq!(parse_page_range("   ").unwrap(), "");
        assert_eq!(parse_page_range("4").unwrap(), "4");
        assert!(parse_page_range("0-2").is_err());
        assert!(parse_page_range("5-2").is_err());
        assert!(parse_page_range("a-b").is_err());
        assert!(parse_page_range("1,,2").is_err());
    }

    #[test]
    fn sides_counts() {
        assert_eq!(Sides::from_count(2), Some(Sides::Duplex));
        assert_eq!(Sides::from_count(3), None);
        assert_eq!(Sides::Simplex.count(), 1);
    }

    #[test]
    fn summary_lists_settings() {
        let text = PrintOptions::default().to_string();
        assert!(text.contains("Full color"));
        assert!(text.contains("Simplex"));
        assert!(text.contains("Page range: all"));
        assert!(!text.contains("2 pages per side"));
    }
}
