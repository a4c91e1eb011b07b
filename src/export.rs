use std::fs;
use std::path::{Path, PathBuf};

use polars::prelude::*;
use tracing::info;

use crate::domain::{
    EXPORT_FILE_NAME, Field, HEADER_LOCATION_COUNT, HEADER_LOCATION_LIST, HEADER_RECORD_COUNT,
    InventoryError,
};
use crate::views::NameSummaryRow;

const UTF8_BOM: &[u8] = "\u{feff}".as_bytes();

pub fn summary_frame(rows: &[NameSummaryRow]) -> PolarsResult<DataFrame> {
    let names: Vec<String> = rows.iter().map(|r| r.item_name.clone()).collect();
    let lists: Vec<String> = rows.iter().map(|r| r.location_list()).collect();
    let location_counts: Vec<u32> = rows.iter().map(|r| r.location_count as u32).collect();
    let record_counts: Vec<u32> = rows.iter().map(|r| r.record_count as u32).collect();

    df!(
        Field::ItemName.header() => names,
        HEADER_LOCATION_LIST => lists,
        HEADER_LOCATION_COUNT => location_counts,
        HEADER_RECORD_COUNT => record_counts
    )
}

/// CSV text of the summary, prefixed with a byte order mark so spreadsheet
/// tools pick UTF-8.
pub fn summary_csv(rows: &[NameSummaryRow]) -> Result<Vec<u8>, InventoryError> {
    let mut df = summary_frame(rows)?;
    let mut buf: Vec<u8> = UTF8_BOM.to_vec();
    CsvWriter::new(&mut buf)
        .include_header(true)
        .finish(&mut df)?;
    Ok(buf)
}

pub fn write_summary(dir: &Path, rows: &[NameSummaryRow]) -> Result<PathBuf, InventoryError> {
    if !dir.is_dir() {
        return Err(InventoryError::Export(format!(
            "{} is not a directory",
            dir.display()
        )));
    }
    let path = dir.join(EXPORT_FILE_NAME);
    fs::write(&path, summary_csv(rows)?)?;
    info!("Exported {} summary rows to {}", rows.len(), path.display());
    Ok(path)
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::inventory::tests::{SAMPLE, table};
    use crate::views::by_item_name;

    fn parse(csv: &[u8]) -> DataFrame {
        let body = csv.strip_prefix(UTF8_BOM).unwrap().to_vec();
        CsvReadOptions::default()
            .with_has_header(true)
            .into_reader_with_file_handle(Cursor::new(body))
            .finish()
            .unwrap()
    }

    fn strings(df: &DataFrame, name: &str) -> Vec<String> {
        df.column(name)
            .unwrap()
            .str()
            .unwrap()
            .into_iter()
            .map(|v| v.unwrap_or_default().to_string())
            .collect()
    }

    #[test]
    fn csv_starts_with_bom_and_localized_header() {
        let rows = by_item_name(&table(SAMPLE), "", false).unwrap();
        let csv = summary_csv(&rows).unwrap();
        assert!(csv.starts_with(&[0xEF, 0xBB, 0xBF]));
        let text = String::from_utf8(csv[3..].to_vec()).unwrap();
        let header = text.lines().next().unwrap();
        assert_eq!(header, "物品名稱,儲存位置清單,位置數量,物品數量");
        assert!(text.contains("RoomA、RoomB"));
    }

    #[test]
    fn csv_round_trip_keeps_name_to_locations() {
        let t = table(&[
            &["編號", "物品名稱", "儲存位置"],
            &["1", "投影機", "副堂"],
            &["2", "投影機", "大堂"],
            &["3", "椅子, 折疊", "大堂"],
        ]);
        let rows = by_item_name(&t, "", false).unwrap();
        let df = parse(&summary_csv(&rows).unwrap());

        assert_eq!(df.height(), rows.len());
        let names = strings(&df, "物品名稱");
        let lists = strings(&df, "儲存位置清單");
        let expected: Vec<(String, String)> = rows
            .iter()
            .map(|r| (r.item_name.clone(), r.location_list()))
            .collect();
        let parsed: Vec<(String, String)> = names.into_iter().zip(lists).collect();
        assert_eq!(parsed, expected);
    }

    #[test]
    fn empty_summary_still_has_header() {
        let csv = summary_csv(&[]).unwrap();
        let text = String::from_utf8(csv[3..].to_vec()).unwrap();
        assert_eq!(text.trim_end(), "物品名稱,儲存位置清單,位置數量,物品數量");
    }

    #[test]
    fn writes_export_file() {
        let dir = tempfile::tempdir().unwrap();
        let rows = by_item_name(&table(SAMPLE), "", false).unwrap();
        let path = write_summary(dir.path(), &rows).unwrap();
        assert_eq!(path.file_name().unwrap(), EXPORT_FILE_NAME);
        assert_eq!(fs::read(path).unwrap(), summary_csv(&rows).unwrap());
    }

    #[test]
    fn export_into_missing_dir_fails() {
        let err = write_summary(Path::new("/no/such/dir"), &[]).unwrap_err();
        assert!(matches!(err, InventoryError::Export(_)));
    }
}
