use std::collections::{BTreeMap, BTreeSet};

use tracing::{trace, warn};

use crate::domain::{Field, LOCATION_DELIMITER, ViewError};
use crate::inventory::{InventoryRecord, InventoryTable};

/// Records of one storage location, projected to id and item name.
#[derive(Debug, Clone, PartialEq)]
pub struct LocationView {
    pub location: Option<String>,
    /// The projected columns that exist in the source, in display order.
    pub columns: Vec<Field>,
    pub rows: Vec<(String, String)>,
    pub count: usize,
}

impl LocationView {
    pub fn caption(&self) -> String {
        match &self.location {
            Some(loc) => format!("儲存位置：{}（{} 筆）", loc, self.count),
            None => format!("全部位置（{} 筆）", self.count),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameSummaryRow {
    pub item_name: String,
    pub locations: Vec<String>,
    pub location_count: usize,
    pub record_count: usize,
}

impl NameSummaryRow {
    pub fn location_list(&self) -> String {
        self.locations.join(LOCATION_DELIMITER)
    }
}

pub fn summary_caption(rows: &[NameSummaryRow]) -> String {
    format!("共 {} 種物品名稱。", rows.len())
}

fn it_filter<'a>(
    table: &'a InventoryTable,
    info_only: bool,
) -> impl Fn(&&'a InventoryRecord) -> bool {
    let active = info_only && table.capabilities().has(Field::ItAsset);
    if info_only && !active {
        warn!("IT asset filter requested but the sheet has no {} column", Field::ItAsset);
    }
    move |record: &&'a InventoryRecord| !active || record.is_it_asset()
}

pub fn by_location(
    table: &InventoryTable,
    location: Option<&str>,
    info_only: bool,
) -> Result<LocationView, ViewError> {
    let caps = table.capabilities();
    let columns: Vec<Field> = [Field::Id, Field::ItemName]
        .into_iter()
        .filter(|f| caps.has(*f))
        .collect();
    if columns.is_empty() {
        return Err(ViewError::MissingColumns(vec![Field::Id, Field::ItemName]));
    }

    // An unset location, or a sheet without locations, shows everything.
    let location = location
        .filter(|l| !l.is_empty())
        .filter(|_| caps.has(Field::Location));

    let keep_it = it_filter(table, info_only);
    let rows: Vec<(String, String)> = table
        .records()
        .iter()
        .filter(|r| location.is_none_or(|l| r.location == l))
        .filter(keep_it)
        .map(|r| (r.id.clone(), r.item_name.clone()))
        .collect();
    trace!("Location view {:?}: {} rows", location, rows.len());

    Ok(LocationView {
        location: location.map(str::to_string),
        columns,
        count: rows.len(),
        rows,
    })
}

pub fn by_item_name(
    table: &InventoryTable,
    keyword: &str,
    info_only: bool,
) -> Result<Vec<NameSummaryRow>, ViewError> {
    if !table.capabilities().has(Field::ItemName) {
        return Err(ViewError::MissingColumns(vec![Field::ItemName]));
    }
    let keyword = keyword.trim().to_lowercase();

    let keep_it = it_filter(table, info_only);
    let mut groups: BTreeMap<&str, (BTreeSet<&str>, usize)> = BTreeMap::new();
    for record in table
        .records()
        .iter()
        .filter(keep_it)
        .filter(|r| keyword.is_empty() || r.item_name.to_lowercase().contains(&keyword))
    {
        let (locations, count) = groups.entry(record.item_name.as_str()).or_default();
        let location = record.location.trim();
        if !location.is_empty() {
            locations.insert(location);
        }
        *count += 1;
    }

    let mut rows: Vec<NameSummaryRow> = groups
        .into_iter()
        .map(|(name, (locations, record_count))| NameSummaryRow {
            item_name: name.to_string(),
            location_count: locations.len(),
            locations: locations.into_iter().map(str::to_string).collect(),
            record_count,
        })
        .collect();

    rows.sort_by(|a, b| {
        a.item_name
            .cmp(&b.item_name)
            .then_with(|| b.location_count.cmp(&a.location_count))
    });
    trace!("Name summary for {:?}: {} names", keyword, rows.len());
    Ok(rows)
}
