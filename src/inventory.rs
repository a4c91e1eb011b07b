use std::cmp::Ordering;
use std::fs;
use std::io::Cursor;
use std::sync::Arc;
use std::time::Instant;

use calamine::{Data, Reader, Xlsx};
use rayon::prelude::*;
use tracing::{debug, info, instrument, trace, warn};

use crate::domain::{Field, InventoryError, SHEET_NAME};
use crate::source::{Source, read_error};

/// Which of the four known fields the loaded sheet actually provides.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    id: bool,
    item_name: bool,
    location: bool,
    it_asset: bool,
}

impl Capabilities {
    pub fn from_fields(fields: &[Field]) -> Self {
        let mut caps = Capabilities::default();
        for field in fields {
            caps.set(*field);
        }
        caps
    }

    fn set(&mut self, field: Field) {
        match field {
            Field::Id => self.id = true,
            Field::ItemName => self.item_name = true,
            Field::Location => self.location = true,
            Field::ItAsset => self.it_asset = true,
        }
    }

    pub fn has(&self, field: Field) -> bool {
        match field {
            Field::Id => self.id,
            Field::ItemName => self.item_name,
            Field::Location => self.location,
            Field::ItAsset => self.it_asset,
        }
    }

    /// Present fields in their canonical column order.
    pub fn fields(&self) -> Vec<Field> {
        Field::ALL.into_iter().filter(|f| self.has(*f)).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.fields().is_empty()
    }
}

/// One row of the inventory sheet. Absent fields hold empty text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InventoryRecord {
    pub id: String,
    pub item_name: String,
    pub location: String,
    pub it_asset: String,
}

impl InventoryRecord {
    pub fn get(&self, field: Field) -> &str {
        match field {
            Field::Id => &self.id,
            Field::ItemName => &self.item_name,
            Field::Location => &self.location,
            Field::ItAsset => &self.it_asset,
        }
    }

    fn get_mut(&mut self, field: Field) -> &mut String {
        match field {
            Field::Id => &mut self.id,
            Field::ItemName => &mut self.item_name,
            Field::Location => &mut self.location,
            Field::ItAsset => &mut self.it_asset,
        }
    }

    pub fn is_it_asset(&self) -> bool {
        self.it_asset.to_uppercase() == "Y"
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct InventoryTable {
    capabilities: Capabilities,
    records: Vec<InventoryRecord>,
}

impl InventoryTable {
    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    pub fn records(&self) -> &[InventoryRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Sorted, distinct, non-empty storage locations.
    pub fn distinct_locations(&self) -> Vec<String> {
        if !self.capabilities.has(Field::Location) {
            return Vec::new();
        }
        let mut locations: Vec<String> = self
            .records
            .iter()
            .map(|r| r.location.clone())
            .filter(|l| !l.is_empty())
            .collect();
        locations.sort();
        locations.dedup();
        locations
    }

    /// Builds the table from a raw text grid: the header row plus data rows.
    ///
    /// Only the known columns are kept, the first occurrence of a header wins.
    pub fn normalize(header: &[String], rows: &[Vec<String>]) -> Self {
        let mut columns: Vec<(Field, usize)> = Vec::new();
        for (idx, name) in header.iter().enumerate() {
            if let Some(field) = Field::from_header(name)
                && !columns.iter().any(|(f, _)| *f == field)
            {
                columns.push((field, idx));
            }
        }
        columns.sort();
        let fields: Vec<Field> = columns.iter().map(|(f, _)| *f).collect();
        let capabilities = Capabilities::from_fields(&fields);
        trace!("Negotiated columns {:?}", fields);

        // Each known column is cleaned independently.
        let cleaned: Vec<(Field, Vec<String>)> = columns
            .par_iter()
            .map(|&(field, idx)| {
                let data = rows
                    .iter()
                    .map(|row| row.get(idx).map(|s| s.trim().to_string()).unwrap_or_default())
                    .collect();
                (field, data)
            })
            .collect();

        let mut records: Vec<InventoryRecord> = (0..rows.len())
            .map(|ridx| {
                let mut record = InventoryRecord::default();
                for (field, data) in cleaned.iter() {
                    *record.get_mut(*field) = data[ridx].clone();
                }
                record
            })
            .filter(|record| fields.iter().any(|f| !record.get(*f).is_empty()))
            .collect();

        let dropped = rows.len() - records.len();
        if dropped > 0 {
            debug!("Dropped {dropped} empty rows");
        }

        // Without both sort columns the file order is kept.
        if capabilities.has(Field::Location) && capabilities.has(Field::Id) {
            records.sort_by(compare_records);
        }

        InventoryTable {
            capabilities,
            records,
        }
    }
}

/// Numeric reading of an id, used for ordering only.
pub fn parse_numeric_id(id: &str) -> Option<f64> {
    id.trim().parse::<f64>().ok().filter(|n| n.is_finite())
}

fn compare_records(a: &InventoryRecord, b: &InventoryRecord) -> Ordering {
    a.location
        .cmp(&b.location)
        .then_with(|| {
            match (parse_numeric_id(&a.id), parse_numeric_id(&b.id)) {
                (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
                (Some(_), None) => Ordering::Less, // Numbers come first
                (None, Some(_)) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            }
        })
        .then_with(|| a.id.cmp(&b.id))
}

fn cell_to_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.trim().to_string(),
        other => other.to_string().trim().to_string(),
    }
}

#[instrument(skip_all, fields(source = %source))]
pub fn load(source: &Source) -> Result<InventoryTable, InventoryError> {
    match source {
        Source::Path(path) => {
            let bytes = fs::read(path).map_err(|e| read_error(path, e))?;
            load_bytes(&path.display().to_string(), Arc::from(bytes))
        }
        Source::Upload { name, bytes } => load_bytes(name, Arc::clone(bytes)),
    }
}

pub fn load_bytes(origin: &str, bytes: Arc<[u8]>) -> Result<InventoryTable, InventoryError> {
    let start_time = Instant::now();
    let mut workbook: Xlsx<_> =
        Xlsx::new(Cursor::new(bytes)).map_err(|e| InventoryError::SourceRead {
            origin: origin.to_string(),
            reason: e.to_string(),
        })?;

    if !workbook.sheet_names().iter().any(|s| s == SHEET_NAME) {
        return Err(InventoryError::MissingSheet {
            origin: origin.to_string(),
            sheet: SHEET_NAME.to_string(),
        });
    }
    let range = workbook
        .worksheet_range(SHEET_NAME)
        .map_err(|e| InventoryError::SourceRead {
            origin: origin.to_string(),
            reason: e.to_string(),
        })?;

    let mut grid = range.rows().map(|row| row.iter().map(cell_to_text).collect::<Vec<_>>());
    let header = grid.next().unwrap_or_default();
    let rows: Vec<Vec<String>> = grid.collect();

    let table = InventoryTable::normalize(&header, &rows);
    if table.capabilities().is_empty() {
        warn!("{origin}: sheet {SHEET_NAME} has none of the known columns");
    }
    info!(
        "Loaded {} records with columns {:?} in {}ms",
        table.len(),
        table.capabilities().fields(),
        start_time.elapsed().as_millis()
    );
    Ok(table)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use rust_xlsxwriter::Workbook;

    pub(crate) const SAMPLE: &[&[&str]] = &[
        &["編號", "物品名稱", "儲存位置", "資訊類產品"],
        &["1", "Chair", "RoomA", "N"],
        &["2", "Chair", "RoomB", "N"],
        &["3", "Lamp", "RoomA", "Y"],
    ];

    /// Writes numeric looking cells as numbers, like a hand made sheet would.
    pub(crate) fn workbook(sheet: &str, rows: &[&[&str]]) -> Vec<u8> {
        let mut wb = Workbook::new();
        let ws = wb.add_worksheet();
        ws.set_name(sheet).unwrap();
        for (r, row) in rows.iter().enumerate() {
            for (c, value) in row.iter().enumerate() {
                if value.is_empty() {
                    continue;
                }
                if let Ok(n) = value.parse::<f64>() {
                    ws.write_number(r as u32, c as u16, n).unwrap();
                } else {
                    ws.write_string(r as u32, c as u16, *value).unwrap();
                }
            }
        }
        wb.save_to_buffer().unwrap()
    }

    pub(crate) fn sample_workbook() -> Vec<u8> {
        workbook(SHEET_NAME, SAMPLE)
    }

    pub(crate) fn table(rows: &[&[&str]]) -> InventoryTable {
        let header: Vec<String> = rows[0].iter().map(|s| s.to_string()).collect();
        let data: Vec<Vec<String>> = rows[1..]
            .iter()
            .map(|r| r.iter().map(|s| s.to_string()).collect())
            .collect();
        InventoryTable::normalize(&header, &data)
    }

    fn ids(table: &InventoryTable) -> Vec<&str> {
        table.records().iter().map(|r| r.id.as_str()).collect()
    }

    #[test]
    fn loads_and_sorts_sample_sheet() {
        let table = load_bytes("sample", sample_workbook().into()).unwrap();
        assert_eq!(table.capabilities().fields(), Field::ALL.to_vec());
        assert_eq!(ids(&table), vec!["1", "3", "2"]);
        assert_eq!(table.records()[0].item_name, "Chair");
        assert_eq!(table.distinct_locations(), vec!["RoomA", "RoomB"]);
    }

    #[test]
    fn loading_is_a_pure_function_of_content() {
        let bytes: Arc<[u8]> = sample_workbook().into();
        let first = load_bytes("a", Arc::clone(&bytes)).unwrap();
        let second = load_bytes("b", bytes).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn missing_sheet_is_reported() {
        let bytes = workbook("Sheet1", SAMPLE);
        let err = load_bytes("wrong", bytes.into()).unwrap_err();
        assert!(matches!(err, InventoryError::MissingSheet { .. }));
    }

    #[test]
    fn garbage_is_a_source_error() {
        let err = load_bytes("junk", Arc::from(&b"hello"[..])).unwrap_err();
        assert!(matches!(err, InventoryError::SourceRead { .. }));
    }

    #[test]
    fn empty_sheet_gives_empty_table() {
        let table = load_bytes("empty", workbook(SHEET_NAME, &[]).into()).unwrap();
        assert!(table.is_empty());
        assert!(table.capabilities().is_empty());
    }

    #[test]
    fn sheet_without_known_columns_has_no_capabilities() {
        let bytes = workbook(SHEET_NAME, &[&["A", "B"], &["x", "y"]]);
        let table = load_bytes("other", bytes.into()).unwrap();
        assert!(table.capabilities().is_empty());
        assert!(table.is_empty());
    }

    #[test]
    fn cells_are_trimmed_and_extra_columns_dropped() {
        let t = table(&[
            &["備註", " 物品名稱 ", "儲存位置"],
            &["note", "  Chair ", " RoomA"],
        ]);
        assert_eq!(t.capabilities().fields(), vec![Field::ItemName, Field::Location]);
        assert_eq!(t.records()[0].item_name, "Chair");
        assert_eq!(t.records()[0].location, "RoomA");
        assert_eq!(t.records()[0].id, "");
    }

    #[test]
    fn fully_empty_rows_are_dropped() {
        let t = table(&[
            &["編號", "物品名稱", "備註"],
            &["", "  ", "only a note"],
            &["7", "", ""],
        ]);
        assert_eq!(ids(&t), vec!["7"]);
    }

    #[test]
    fn short_rows_read_as_empty() {
        let t = table(&[&["編號", "物品名稱", "儲存位置"], &["1"]]);
        assert_eq!(t.records()[0].location, "");
    }

    #[test]
    fn non_numeric_ids_sort_last_within_location() {
        let t = table(&[
            &["編號", "儲存位置"],
            &["A-1", "RoomA"],
            &["10", "RoomA"],
            &["", "RoomA"],
            &["2", "RoomA"],
            &["1", "RoomB"],
        ]);
        assert_eq!(ids(&t), vec!["2", "10", "", "A-1", "1"]);
    }

    #[test]
    fn equal_ids_keep_file_order() {
        let t = table(&[
            &["編號", "物品名稱", "儲存位置"],
            &["5", "second", "RoomA"],
            &["5", "first", "RoomA"],
        ]);
        let names: Vec<&str> = t.records().iter().map(|r| r.item_name.as_str()).collect();
        assert_eq!(names, vec!["second", "first"]);
    }

    #[test]
    fn no_sort_without_location_column() {
        let t = table(&[&["編號", "物品名稱"], &["3", "c"], &["1", "a"]]);
        assert_eq!(ids(&t), vec!["3", "1"]);
    }

    #[test]
    fn numeric_id_parse() {
        assert_eq!(parse_numeric_id("12"), Some(12.0));
        assert_eq!(parse_numeric_id("1.5"), Some(1.5));
        assert_eq!(parse_numeric_id("nan"), None);
        assert_eq!(parse_numeric_id("A-1"), None);
        assert_eq!(parse_numeric_id(""), None);
    }

    #[test]
    fn it_asset_flag_is_case_insensitive() {
        let mut record = InventoryRecord {
            it_asset: "y".to_string(),
            ..Default::default()
        };
        assert!(record.is_it_asset());
        record.it_asset = "N".to_string();
        assert!(!record.is_it_asset());
        record.it_asset.clear();
        assert!(!record.is_it_asset());
    }
}
