use crate::models::{CellValue, Row};

/// Rows and column names produced by decoding an uploaded file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecodedSheet {
    pub rows: Vec<Row>,
    pub columns: Vec<String>,
}

/// First sheet of a file before projection: unique header names and the
/// positional cells of every data row.
#[derive(Debug, Clone, Default)]
pub struct RawSheet {
    pub headers: Vec<String>,
    pub cells: Vec<Vec<CellValue>>,
}

impl RawSheet {
    /// Drops fully blank rows, derives the columns from the keys present in
    /// the first remaining row and projects every row onto those columns.
    pub fn into_decoded(self) -> DecodedSheet {
        let RawSheet { headers, cells } = self;

        let records: Vec<Vec<CellValue>> = cells
            .into_iter()
            .filter(|row| row.iter().any(|cell| !matches!(cell, CellValue::Missing)))
            .collect();

        let Some(first) = records.first() else {
            return DecodedSheet::default();
        };

        let positions: Vec<usize> = headers
            .iter()
            .enumerate()
            .filter(|(idx, _)| matches!(first.get(*idx), Some(cell) if !matches!(cell, CellValue::Missing)))
            .map(|(idx, _)| idx)
            .collect();

        let columns: Vec<String> = positions.iter().map(|&idx| headers[idx].clone()).collect();

        let rows = records
            .into_iter()
            .map(|mut record| {
                positions
                    .iter()
                    .zip(&columns)
                    .map(|(&idx, name)| {
                        let value = record.get_mut(idx).map(std::mem::take).unwrap_or_default();
                        (name.clone(), value)
                    })
                    .collect::<Row>()
            })
            .collect();

        DecodedSheet { rows, columns }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sheet(headers: &[&str], cells: Vec<Vec<CellValue>>) -> RawSheet {
        RawSheet {
            headers: headers.iter().map(|h| h.to_string()).collect(),
            cells,
        }
    }

    #[test]
    fn columns_follow_first_record_keys() {
        let raw = sheet(
            &["a", "b", "c"],
            vec![
                vec![CellValue::from("x"), CellValue::Missing, CellValue::Number(1.0)],
                vec![CellValue::from("y"), CellValue::from("dropped"), CellValue::Number(2.0)],
            ],
        );

        let decoded = raw.into_decoded();
        assert_eq!(decoded.columns, vec!["a", "c"]);
        assert_eq!(decoded.rows.len(), 2);
        assert!(decoded.rows.iter().all(|row| row.len() == 2));
        assert_eq!(decoded.rows[1]["c"], CellValue::Number(2.0));
    }

    #[test]
    fn blank_rows_are_skipped_and_short_rows_padded() {
        let raw = sheet(
            &["a", "b"],
            vec![
                vec![CellValue::Missing, CellValue::Missing],
                vec![CellValue::from("x"), CellValue::Number(1.0)],
                vec![CellValue::from("y")],
            ],
        );

        let decoded = raw.into_decoded();
        assert_eq!(decoded.columns, vec!["a", "b"]);
        assert_eq!(decoded.rows.len(), 2);
        assert_eq!(decoded.rows[1]["b"], CellValue::Missing);
    }

    #[test]
    fn no_records_means_no_columns() {
        let decoded = sheet(&["a"], vec![]).into_decoded();
        assert!(decoded.rows.is_empty());
        assert!(decoded.columns.is_empty());
    }
}
