use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{AssessError, Result};

/// One labelled row of `historical_cases.csv`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoricalCase {
    pub case_id: String,
    pub amount: f64,
    pub country: String,
    pub device_new: bool,
    pub velocity: u32,
    pub merchant_category: String,
    pub account_age_days: u32,
    pub label: String,
    pub notes: String,
    pub risk_score: f64,
}

impl HistoricalCase {
    /// Rendered the way the chunk text is stored: one `column: value` line per field.
    pub fn to_chunk_text(&self) -> String {
        format!(
            "case_id: {}\namount: {}\ncountry: {}\ndevice_new: {}\nvelocity: {}\nmerchant_category: {}\naccount_age_days: {}\nlabel: {}\nnotes: {}\nrisk_score: {}",
            self.case_id,
            self.amount,
            self.country,
            self.device_new,
            self.velocity,
            self.merchant_category,
            self.account_age_days,
            self.label,
            self.notes,
            self.risk_score
        )
    }

    pub fn is_high_risk(&self) -> bool {
        self.label.eq_ignore_ascii_case("high")
    }
}

pub fn load_cases(path: &Path) -> Result<Vec<HistoricalCase>> {
    let file = std::fs::File::open(path).map_err(|e| AssessError::io(path, e))?;
    read_cases(file)
}

pub fn read_cases<R: std::io::Read>(reader: R) -> Result<Vec<HistoricalCase>> {
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut cases = Vec::new();
    for row in rdr.deserialize() {
        let case: HistoricalCase = row?;
        cases.push(case);
    }
    Ok(cases)
}

#[cfg(test)]
mod tests {
    use super::*;

    const CSV: &str = "case_id,amount,country,device_new,velocity,merchant_category,account_age_days,label,notes,risk_score\n\
C001,120.50,DE,false,1,grocery,1200,Low,\"Regular weekly shop, known device\",0.05\n\
C002,48000,NG,true,8,electronics,3,High,Tier-1 country with new device,0.95\n";

    #[test]
    fn reads_quoted_notes_and_typed_columns() {
        let cases = read_cases(CSV.as_bytes()).unwrap();
        assert_eq!(cases.len(), 2);
        assert_eq!(cases[0].notes, "Regular weekly shop, known device");
        assert!(!cases[0].device_new);
        assert!(cases[1].is_high_risk());
        assert_eq!(cases[1].velocity, 8);
    }

    #[test]
    fn chunk_text_lists_columns() {
        let cases = read_cases(CSV.as_bytes()).unwrap();
        let text = cases[1].to_chunk_text();
        assert!(text.starts_with("case_id: C002\n"));
        assert!(text.contains("country: NG"));
        assert!(text.contains("label: High"));
    }

    #[test]
    fn bad_row_is_an_error() {
        let broken = "case_id,amount,country,device_new,velocity,merchant_category,account_age_days,label,notes,risk_score\nC9,abc,DE,false,1,x,1,Low,n,0.1\n";
        assert!(matches!(read_cases(broken.as_bytes()), Err(AssessError::Csv(_))));
    }
}
