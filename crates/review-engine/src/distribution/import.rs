use std::collections::BTreeMap;
use std::io::Read;

use super::domain::{attribute_name, ItemId, NewItem};

const ID_HEADER: &str = "item_id";
const COURSE_HEADER: &str = "course";
const MODALITY_HEADER: &str = "modality";

/// Error raised while reading an item roster.
#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    #[error(transparent)]
    Csv(#[from] csv::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("item roster is missing the `{0}` column")]
    MissingColumn(&'static str),
    #[error("row {row} has an empty `{column}` value")]
    EmptyValue { row: usize, column: &'static str },
}

/// Reads `item_id,course,modality,...` rows. Any further column becomes an item attribute.
pub fn parse_items<R: Read>(reader: R) -> Result<Vec<NewItem>, ImportError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);
    let headers = csv_reader.headers()?.clone();
    let position = |name: &'static str| {
        headers
            .iter()
            .position(|header| header.eq_ignore_ascii_case(name))
            .ok_or(ImportError::MissingColumn(name))
    };
    let id_at = position(ID_HEADER)?;
    let course_at = position(COURSE_HEADER)?;
    let modality_at = position(MODALITY_HEADER)?;

    let mut items = Vec::new();
    for (index, record) in csv_reader.records().enumerate() {
        let record = record?;
        let row = index + 2;
        let field = |at: usize, column: &'static str| {
            record
                .get(at)
                .filter(|value| !value.is_empty())
                .map(str::to_string)
                .ok_or(ImportError::EmptyValue { row, column })
        };

        let mut attributes = BTreeMap::new();
        for (at, header) in headers.iter().enumerate() {
            if at == id_at || at == course_at || at == modality_at {
                continue;
            }
            if let Some(value) = record.get(at).filter(|value| !value.is_empty()) {
                attributes.insert(attribute_name(header), value.to_string());
            }
        }

        items.push(NewItem {
            id: ItemId(field(id_at, ID_HEADER)?),
            course: field(course_at, COURSE_HEADER)?,
            modality: field(modality_at, MODALITY_HEADER)?,
            attributes,
        });
    }

    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distribution::domain::{Column, KindTag, PhaseId};

    #[test]
    fn extra_columns_become_attributes() {
        let roster = "item_id,course,modality,campus,shift\n\
                      a-1, Nursing ,open,north,\n\
                      a-2,Nursing,quota,south,night\n";
        let items = parse_items(roster.as_bytes()).expect("roster parses");

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].course, "Nursing");
        assert_eq!(items[0].attributes.get("campus").map(String::as_str), Some("north"));
        assert!(!items[0].attributes.contains_key("shift"));
        assert_eq!(items[1].attributes.get("shift").map(String::as_str), Some("night"));
    }

    #[test]
    fn headers_match_rules_regardless_of_case() {
        let roster = "ITEM_ID,Course,Modality, Campus \na-1,Law,open,north\n";
        let items = parse_items(roster.as_bytes()).expect("roster parses");
        let item = items[0]
            .clone()
            .into_work_item(KindTag::Admission, PhaseId("phase-1".to_string()));

        assert_eq!(items[0].attributes.get("campus").map(String::as_str), Some("north"));
        assert!(Column::from("campus".to_string()).matches(&item, "north"));
        assert!(Column::from("CAMPUS".to_string()).matches(&item, "north"));
    }

    #[test]
    fn missing_required_column_is_reported() {
        let error = parse_items("item_id,course\na-1,Nursing\n".as_bytes())
            .expect_err("modality is required");
        assert!(matches!(error, ImportError::MissingColumn("modality")));
    }

    #[test]
    fn empty_identifier_names_the_row() {
        let error = parse_items("item_id,course,modality\n,Nursing,open\n".as_bytes())
            .expect_err("id is required");
        assert!(matches!(
            error,
            ImportError::EmptyValue {
                row: 2,
                column: "item_id"
            }
        ));
    }
}
