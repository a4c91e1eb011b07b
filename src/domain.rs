use std::fmt;
use std::io::Error;
use std::path::PathBuf;

use derive_setters::Setters;
use polars::error::PolarsError;
use ratatui::crossterm::event::KeyEvent;
use thiserror::Error;

pub const PAGE_TITLE: &str = "真耶穌教會斗六教會財產清單";
pub const SHEET_NAME: &str = "清單";
pub const DEFAULT_SOURCE: &str = "教會財產盤點_依空間整理.xlsx";
pub const EXPORT_FILE_NAME: &str = "物品名稱_對應儲存位置_彙總.csv";

/// Joins the locations of one item name. Not expected inside a location name.
pub const LOCATION_DELIMITER: &str = "、";

pub const HEADER_LOCATION_LIST: &str = "儲存位置清單";
pub const HEADER_LOCATION_COUNT: &str = "位置數量";
pub const HEADER_RECORD_COUNT: &str = "物品數量";

pub const INFO_ONLY_LABEL: &str = "只顯示資訊類產品（Y）";
pub const UPLOAD_PROMPT: &str =
    "請上傳 Excel 檔案（需包含工作表『清單』，欄位：編號、物品名稱、儲存位置、資訊類產品）";

/// The four known columns of the inventory sheet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Field {
    Id,
    ItemName,
    Location,
    ItAsset,
}

impl Field {
    pub const ALL: [Field; 4] = [Field::Id, Field::ItemName, Field::Location, Field::ItAsset];

    pub fn header(&self) -> &'static str {
        match self {
            Field::Id => "編號",
            Field::ItemName => "物品名稱",
            Field::Location => "儲存位置",
            Field::ItAsset => "資訊類產品",
        }
    }

    pub fn from_header(header: &str) -> Option<Field> {
        Field::ALL.into_iter().find(|f| f.header() == header.trim())
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.header())
    }
}

#[derive(Debug, Error)]
pub enum InventoryError {
    #[error("cannot read {origin}: {reason}")]
    SourceRead { origin: String, reason: String },
    #[error("{origin} has no worksheet named '{sheet}'")]
    MissingSheet { origin: String, sheet: String },
    #[error("io error: {0}")]
    Io(#[from] Error),
    #[error("csv export failed: {0}")]
    Polars(#[from] PolarsError),
    #[error("export failed: {0}")]
    Export(String),
}

impl InventoryError {
    /// True for the failures that mean "this source is not a usable inventory".
    pub fn is_source_error(&self) -> bool {
        matches!(
            self,
            InventoryError::SourceRead { .. } | InventoryError::MissingSheet { .. }
        )
    }
}

/// Soft signal raised by the views when the columns they render are absent.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ViewError {
    #[error("找不到欄位：{}", join_fields(.0))]
    MissingColumns(Vec<Field>),
}

fn join_fields(fields: &[Field]) -> String {
    fields
        .iter()
        .map(|f| f.header())
        .collect::<Vec<_>>()
        .join("、")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    ByItemName,
    ByLocation,
}

impl Mode {
    pub fn title(&self) -> &'static str {
        match self {
            Mode::ByItemName => "🧾 依物品名稱彙總",
            Mode::ByLocation => "📁 依儲存位置瀏覽",
        }
    }

    pub fn index(&self) -> usize {
        match self {
            Mode::ByItemName => 0,
            Mode::ByLocation => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Keyword,
    OpenFile,
}

#[derive(Debug, Clone)]
pub enum Message {
    Quit,
    SwitchMode,
    NextLocation,
    PrevLocation,
    ToggleInfoOnly,
    MoveUp,
    MoveDown,
    MovePageUp,
    MovePageDown,
    MoveBeginning,
    MoveEnd,
    EditKeyword,
    OpenFile,
    Export,
    CopyRow,
    Help,
    Exit,
    Resize(usize, usize),
    RawKey(KeyEvent),
}

#[derive(Debug, Clone, Setters)]
#[setters(into)]
pub struct ViewerConfig {
    pub event_poll_time: u64,
    pub export_dir: PathBuf,
    pub default_source: PathBuf,
    pub log_file: PathBuf,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        ViewerConfig {
            event_poll_time: 100,
            export_dir: PathBuf::from("."),
            default_source: PathBuf::from(DEFAULT_SOURCE),
            log_file: PathBuf::from("inventory-viewer.log"),
        }
    }
}

pub const HELP_TEXT: &str = "\
Tab        switch between 依物品名稱彙總 / 依儲存位置瀏覽
←/→        previous / next 儲存位置
i          toggle 只顯示資訊類產品（Y）
/          edit the 物品名稱 keyword
o          open another .xlsx file
e          export the summary as CSV
y          copy the selected row
↑/↓ PgUp PgDn Home End   move
Esc        close popup / cancel input
q          quit";
