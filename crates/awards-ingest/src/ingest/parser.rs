//! NSF award abstract parser
//!
//! Award files are label/value text:
//!
//! ```text
//! Title       : Dynamics of Ceramic Grain Boundaries
//! Type        : Award
//! NSF Org     : DMR
//! Latest
//! Amendment
//! Date        : August 1,  1991
//! File        : a9000006
//!
//! Award Number: 9000006
//! Award Instr.: Standard Grant
//! Prgm Manager: Liselotte J. Schioler
//! Start Date  : June 1,  1990
//! Expires     : November 30,  1992   (Estimated)
//! Expected
//! Total Amt.  : $140,000            (Estimated)
//! Investigator: Jane Doe  (Principal Investigator current)
//! Sponsor     : U of Washington
//!               4333 Brooklyn Ave NE
//!               Seattle, WA  98195    206/543-4043
//!
//! NSF Program : 1711      CERAMICS
//! Fld Applictn: 0106000   Materials Research
//! Program Ref : 9161,9216,AMPP,
//! Abstract    :
//!               9000006 Grain boundaries in ...
//! ```
//!
//! Each label is matched independently, so a missing or garbled line only
//! nulls its own field. Words inside a label may be separated by any
//! whitespace, including line breaks (`Latest\nAmendment\nDate`).

use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use regex::Regex;
use std::str::FromStr;

use super::error::FieldWarning;
use super::models::{ParseOutcome, ParsedRecord, Sponsor};
use super::normalizer::{split_coded_entries, split_investigators, split_program_refs};

/// Date layout used by every date field, e.g. `June 1, 1990`
const DATE_FORMAT: &str = "%B %d, %Y";

/// How much text after the colon a label owns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Extent {
    /// Rest of the label line
    Line,
    /// Rest of the line plus indented continuation lines
    Block,
    /// Everything to the end of the file
    Text,
}

/// The sixteen recognised labels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Title,
    Type,
    NsfOrg,
    LatestAmendmentDate,
    File,
    AwardNumber,
    AwardInstr,
    PrgmManager,
    StartDate,
    Expires,
    ExpectedTotalAmt,
    Investigator,
    Abstract,
    NsfProgram,
    FldApplictn,
    ProgramRef,
}

impl Field {
    pub const ALL: [Field; 16] = [
        Field::Title,
        Field::Type,
        Field::NsfOrg,
        Field::LatestAmendmentDate,
        Field::File,
        Field::AwardNumber,
        Field::AwardInstr,
        Field::PrgmManager,
        Field::StartDate,
        Field::Expires,
        Field::ExpectedTotalAmt,
        Field::Investigator,
        Field::Abstract,
        Field::NsfProgram,
        Field::FldApplictn,
        Field::ProgramRef,
    ];

    /// Field name as used in warnings and the destination schema
    pub fn column(self) -> &'static str {
        match self {
            Field::Title => "title",
            Field::Type => "type",
            Field::NsfOrg => "nsf_org",
            Field::LatestAmendmentDate => "latest_amendment_date",
            Field::File => "file",
            Field::AwardNumber => "award_number",
            Field::AwardInstr => "award_instr",
            Field::PrgmManager => "prgm_manager",
            Field::StartDate => "start_date",
            Field::Expires => "expires",
            Field::ExpectedTotalAmt => "expected_total_amt",
            Field::Investigator => "investigator",
            Field::Abstract => "abstract",
            Field::NsfProgram => "nsf_program",
            Field::FldApplictn => "fld_applictn",
            Field::ProgramRef => "program_ref",
        }
    }

    /// Label as it appears in award files
    pub fn label(self) -> &'static str {
        match self {
            Field::Title => "Title",
            Field::Type => "Type",
            Field::NsfOrg => "NSF Org",
            Field::LatestAmendmentDate => "Latest Amendment Date",
            Field::File => "File",
            Field::AwardNumber => "Award Number",
            Field::AwardInstr => "Award Instr.",
            Field::PrgmManager => "Prgm Manager",
            Field::StartDate => "Start Date",
            Field::Expires => "Expires",
            Field::ExpectedTotalAmt => "Expected Total Amt.",
            Field::Investigator => "Investigator",
            Field::Abstract => "Abstract",
            Field::NsfProgram => "NSF Program",
            Field::FldApplictn => "Fld Applictn",
            Field::ProgramRef => "Program Ref",
        }
    }

    fn extent(self) -> Extent {
        match self {
            Field::Abstract => Extent::Text,
            Field::Investigator | Field::NsfProgram | Field::FldApplictn | Field::ProgramRef => {
                Extent::Block
            }
            _ => Extent::Line,
        }
    }

    /// Label regex: words joined by any whitespace, trailing '.' optional
    fn label_pattern(self) -> String {
        self.label()
            .trim_end_matches('.')
            .split(' ')
            .map(regex::escape)
            .collect::<Vec<_>>()
            .join(r"\s+")
            + r"\.?"
    }
}

struct FieldRule {
    field: Field,
    regex: Regex,
}

impl FieldRule {
    fn new(field: Field) -> Result<Self, regex::Error> {
        let head = format!(r"(?m)^[ \t]*{}[ \t]*:", field.label_pattern());
        let pattern = match field.extent() {
            Extent::Line => format!(r"{head}[ \t]*(\S[^\n]*)"),
            Extent::Block => format!(r"{head}[ \t]*(\S[^\n]*(?:\n[ \t]+\S[^\n]*)*)"),
            Extent::Text => format!(r"{head}((?s:.*))"),
        };
        Ok(Self {
            field,
            regex: Regex::new(&pattern)?,
        })
    }

    fn capture<'t>(&self, text: &'t str) -> Option<&'t str> {
        self.regex
            .captures(text)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().trim())
            .filter(|value| !value.is_empty())
    }
}

/// Raw matched text per label, before typing
#[derive(Debug, Default)]
struct RawFields<'t> {
    values: Vec<(Field, &'t str)>,
}

impl<'t> RawFields<'t> {
    fn get(&self, field: Field) -> Option<&'t str> {
        self.values
            .iter()
            .find(|(f, _)| *f == field)
            .map(|(_, value)| *value)
    }

    fn text(&self, field: Field) -> Option<String> {
        self.get(field).map(str::to_string)
    }
}

/// Pattern-based award parser; build once and share
pub struct AwardParser {
    rules: Vec<FieldRule>,
    sponsor: Regex,
    annotation: Regex,
    separator_run: Regex,
    leading_token: Regex,
}

impl AwardParser {
    pub fn new() -> Result<Self, regex::Error> {
        let rules = Field::ALL
            .iter()
            .map(|field| FieldRule::new(*field))
            .collect::<Result<Vec<_>, _>>()?;

        // name line, address line, address line ending in (or followed by) the phone
        let sponsor = Regex::new(
            r"(?m)^[ \t]*Sponsor[ \t]*:[ \t]*(\S[^\n]*)\n[ \t]*([^\n]*)\n[ \t]*([^\n]*?)[ \t]*(?:\n[ \t]*)?(\d{3}/\d{3}-\d{4})",
        )?;

        Ok(Self {
            rules,
            sponsor,
            annotation: Regex::new(r"\s*\(.*\)")?,
            separator_run: Regex::new(r"[-=]{5,}")?,
            leading_token: Regex::new(r"\A\s*\d{7}\b")?,
        })
    }

    /// Parse one decoded award file
    ///
    /// NUL and U+FFFD are removed before matching, so every value is
    /// trimmed and split on clean text and a value that cleans to nothing
    /// is missing.
    pub fn parse(&self, text: &str) -> ParseOutcome {
        let cleaned = clean_value(text);
        let text = cleaned.as_str();
        let mut warnings = Vec::new();
        let mut raw = RawFields::default();

        for rule in &self.rules {
            match rule.capture(text) {
                Some(value) => raw.values.push((rule.field, value)),
                None => warnings.push(FieldWarning::PatternMissing {
                    field: rule.field.column(),
                }),
            }
        }

        let sponsor = self.parse_sponsor(text);
        if sponsor.is_none() {
            warnings.push(FieldWarning::MalformedSponsorBlock);
        }

        let mut date = |field: Field| {
            raw.get(field).and_then(|value| {
                self.parse_date(field.column(), value)
                    .map_err(|w| warnings.push(w))
                    .ok()
            })
        };
        let latest_amendment_date = date(Field::LatestAmendmentDate);
        let start_date = date(Field::StartDate);
        let expiration_date = date(Field::Expires);

        let expected_total_amount = raw.get(Field::ExpectedTotalAmt).and_then(|value| {
            self.parse_amount(Field::ExpectedTotalAmt.column(), value)
                .map_err(|w| warnings.push(w))
                .ok()
        });

        let record = ParsedRecord {
            title: raw.text(Field::Title),
            award_type: raw.text(Field::Type),
            nsf_org: raw.text(Field::NsfOrg),
            latest_amendment_date,
            file_ref: raw.text(Field::File),
            award_number: raw.text(Field::AwardNumber),
            award_instrument: raw.text(Field::AwardInstr),
            program_manager: raw.text(Field::PrgmManager),
            start_date,
            expiration_date,
            expected_total_amount,
            abstract_text: raw
                .get(Field::Abstract)
                .and_then(|value| self.normalize_abstract(value)),
            investigators: raw
                .get(Field::Investigator)
                .map(split_investigators)
                .unwrap_or_default(),
            sponsor,
            programs: raw.get(Field::NsfProgram).map(split_coded_entries).unwrap_or_default(),
            field_applications: raw
                .get(Field::FldApplictn)
                .map(split_coded_entries)
                .unwrap_or_default(),
            program_refs: raw
                .get(Field::ProgramRef)
                .map(split_program_refs)
                .unwrap_or_default(),
        };

        ParseOutcome { record, warnings }
    }

    /// Match the fixed sponsor block shape; anything else yields no sponsor
    pub fn parse_sponsor(&self, text: &str) -> Option<Sponsor> {
        let caps = self.sponsor.captures(text)?;
        let part = |i: usize| caps.get(i).map(|m| m.as_str().trim()).unwrap_or_default();

        let address = [part(2), part(3)]
            .into_iter()
            .filter(|line| !line.is_empty())
            .collect::<Vec<_>>()
            .join(", ");

        Some(Sponsor {
            name: part(1).to_string(),
            address,
            phone: part(4).to_string(),
        })
    }

    /// `November 30,  1992   (Estimated)` -> 1992-11-30
    pub fn parse_date(
        &self,
        field: &'static str,
        value: &str,
    ) -> Result<NaiveDate, FieldWarning> {
        let stripped = self.annotation.replace_all(value, "");
        let cleaned = stripped.split_whitespace().collect::<Vec<_>>().join(" ");

        NaiveDate::parse_from_str(&cleaned, DATE_FORMAT).map_err(|_| FieldWarning::DateParse {
            field,
            value: value.to_string(),
        })
    }

    /// `$123,456 (Estimated)` -> 123456
    pub fn parse_amount(
        &self,
        field: &'static str,
        value: &str,
    ) -> Result<BigDecimal, FieldWarning> {
        let stripped = self.annotation.replace_all(value.trim(), "");
        let digits: String = stripped
            .trim()
            .trim_start_matches('$')
            .chars()
            .filter(|c| *c != ',' && !c.is_whitespace())
            .collect();

        BigDecimal::from_str(&digits).map_err(|_| FieldWarning::CurrencyParse {
            field,
            value: value.to_string(),
        })
    }

    /// Collapse whitespace, drop separator rules and the leading award-number token
    pub fn normalize_abstract(&self, value: &str) -> Option<String> {
        let without_token = self.leading_token.replace(value, "");
        let without_rules = self.separator_run.replace_all(&without_token, " ");
        let collapsed = without_rules.split_whitespace().collect::<Vec<_>>().join(" ");
        (!collapsed.is_empty()).then_some(collapsed)
    }
}

/// Strip NUL bytes and U+FFFD replacement characters
pub fn clean_value(value: &str) -> String {
    value.replace(['\0', '\u{FFFD}'], "")
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn parser() -> AwardParser {
        AwardParser::new().unwrap()
    }

    #[test]
    fn test_label_patterns_allow_line_breaks() {
        let parser = parser();
        let text = "Latest\nAmendment\nDate        : August 1,  1991\n";
        let outcome = parser.parse(text);
        assert_eq!(
            outcome.record.latest_amendment_date,
            NaiveDate::from_ymd_opt(1991, 8, 1)
        );
    }

    #[test]
    fn test_date_with_estimate_annotation() {
        let date = parser()
            .parse_date("expires", "January 5, 1990 (Estimated)")
            .unwrap();
        assert_eq!(date, NaiveDate::from_ymd_opt(1990, 1, 5).unwrap());
    }

    #[test]
    fn test_bad_date_is_a_warning() {
        let result = parser().parse_date("start_date", "sometime in 1990");
        assert!(matches!(result, Err(FieldWarning::DateParse { field: "start_date", .. })));
    }

    #[test]
    fn test_amount_with_separators_and_annotation() {
        let amount = parser()
            .parse_amount("expected_total_amt", "$123,456 (Estimated)")
            .unwrap();
        assert_eq!(amount, BigDecimal::from(123456));
    }

    #[test]
    fn test_amount_garbage_is_a_warning() {
        let result = parser().parse_amount("expected_total_amt", "$ TBD");
        assert!(matches!(result, Err(FieldWarning::CurrencyParse { .. })));
    }

    #[test]
    fn test_abstract_normalization() {
        let raw = "\n   9000006 Grain   boundaries\n  ----------\n control\n=====  the  rest\n";
        let abstract_text = parser().normalize_abstract(raw).unwrap();
        assert_eq!(abstract_text, "Grain boundaries control the rest");
    }

    #[test]
    fn test_abstract_keeps_non_seven_digit_numbers() {
        let abstract_text = parser().normalize_abstract("12345678 atoms and 1234567x").unwrap();
        assert_eq!(abstract_text, "12345678 atoms and 1234567x");
    }

    #[test]
    fn test_abstract_keeps_later_line_start_numbers() {
        let raw = "\n  9000006 Intro text about\n  1234567 samples were collected.\n";
        let abstract_text = parser().normalize_abstract(raw).unwrap();
        assert_eq!(abstract_text, "Intro text about 1234567 samples were collected.");
    }

    #[test]
    fn test_sponsor_with_phone_on_third_line() {
        let text = "Sponsor     : U of Washington\n              4333 Brooklyn Ave NE\n              Seattle, WA  98195    206/543-4043\n";
        let sponsor = parser().parse_sponsor(text).unwrap();
        assert_eq!(sponsor.name, "U of Washington");
        assert_eq!(sponsor.address, "4333 Brooklyn Ave NE, Seattle, WA  98195");
        assert_eq!(sponsor.phone, "206/543-4043");
    }

    #[test]
    fn test_sponsor_with_phone_on_own_line() {
        let text = "Sponsor     : MIT\n   77 Massachusetts Ave\n   Cambridge, MA 02139\n   617/253-1000\n";
        let sponsor = parser().parse_sponsor(text).unwrap();
        assert_eq!(sponsor.address, "77 Massachusetts Ave, Cambridge, MA 02139");
        assert_eq!(sponsor.phone, "617/253-1000");
    }

    #[test]
    fn test_sponsor_without_phone_is_absent() {
        let text = "Sponsor     : MIT\n   77 Massachusetts Ave\n   Cambridge, MA 02139\n\nNSF Program : 1711 CERAMICS\n";
        assert!(parser().parse_sponsor(text).is_none());
    }

    #[test]
    fn test_empty_label_value_is_missing() {
        let outcome = parser().parse("Title       :\nType        : Award\n");
        assert!(outcome.record.title.is_none());
        assert_eq!(outcome.record.award_type.as_deref(), Some("Award"));
        assert!(outcome
            .warnings
            .contains(&FieldWarning::PatternMissing { field: "title" }));
    }

    #[test]
    fn test_clean_value_strips_nul_and_replacement() {
        assert_eq!(clean_value("Gr\u{FFFD}ain\0s"), "Grains");
    }

    #[test]
    fn test_replacement_next_to_whitespace_leaves_trimmed_keys() {
        let text = "Award Number: 9000001\u{FFFD}\n\
                    Investigator: Jane Doe \u{FFFD}(Principal Investigator)\n\
                    NSF Program : 1711\0  CERAMICS \u{FFFD}\n";
        let record = parser().parse(text).record;

        assert_eq!(record.award_number.as_deref(), Some("9000001"));
        assert_eq!(record.investigators[0].name, "Jane Doe");
        assert_eq!(record.investigators[0].role, "Principal Investigator");
        assert_eq!(record.programs[0].code, "1711");
        assert_eq!(record.programs[0].name, "CERAMICS");
    }

    #[test]
    fn test_value_of_only_replacement_characters_is_missing() {
        let outcome = parser().parse("Title       : T\nAward Number: \u{FFFD}\0\n");
        assert_eq!(outcome.record.award_number, None);
        assert!(outcome
            .warnings
            .contains(&FieldWarning::PatternMissing { field: "award_number" }));
    }

    #[test]
    fn test_label_pattern_shape() {
        assert_eq!(Field::AwardInstr.label_pattern(), r"Award\s+Instr\.?");
        assert_eq!(Field::NsfOrg.label_pattern(), r"NSF\s+Org\.?");
    }
}
