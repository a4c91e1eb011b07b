use std::sync::Arc;

use arboard::Clipboard;
use ratatui::crossterm::event::KeyEvent;
use tracing::{debug, error, info, trace, warn};

use crate::domain::{
    Field, HEADER_LOCATION_COUNT, HEADER_LOCATION_LIST, HEADER_RECORD_COUNT, HELP_TEXT,
    INFO_ONLY_LABEL, InputMode, InventoryError, Message, Mode, UPLOAD_PROMPT, ViewError,
    ViewerConfig,
};
use crate::export;
use crate::inputter::{InputResult, Inputter};
use crate::inventory::InventoryTable;
use crate::source::{Source, SourceCache, expand_path};
use crate::ui::TABLE_CHROME_HEIGHT;
use crate::views::{self, LocationView, NameSummaryRow};

#[derive(Debug, PartialEq)]
pub enum Status {
    EMPTY,
    READY,
    QUITTING,
}

/// What the current mode shows in place of the table body.
enum Listing {
    Location(LocationView),
    Summary(Vec<NameSummaryRow>),
    Missing(ViewError),
    NoData,
}

/// Everything the ui needs to draw one frame.
pub struct UIData {
    pub source_name: String,
    pub mode: Mode,
    pub filter_line: String,
    pub caption: String,
    pub header: Vec<String>,
    pub rows: Vec<Vec<String>>,
    pub notice: Option<String>,
    pub selected_row: usize,
    pub input: Option<(InputMode, InputResult)>,
    pub show_popup: bool,
    pub popup_message: String,
    pub status_message: String,
}

impl UIData {
    pub fn empty() -> Self {
        UIData {
            source_name: String::new(),
            mode: Mode::ByItemName,
            filter_line: String::new(),
            caption: String::new(),
            header: Vec::new(),
            rows: Vec::new(),
            notice: None,
            selected_row: 0,
            input: None,
            show_popup: false,
            popup_message: String::new(),
            status_message: String::new(),
        }
    }
}

/// State of one viewing session: its loaded tables and its filter choices.
pub struct Model {
    config: ViewerConfig,
    pub status: Status,
    cache: SourceCache,
    table: Option<Arc<InventoryTable>>,
    source_name: String,
    mode: Mode,
    locations: Vec<String>,
    location_idx: usize,
    info_only_by_location: bool,
    info_only_by_name: bool,
    keyword: String,
    keyword_before_edit: String,
    input: Inputter,
    input_mode: Option<InputMode>,
    last_input: InputResult,
    listing: Listing,
    curser_row: usize,
    page_height: usize,
    uidata: UIData,
    clipboard: Option<Clipboard>,
}

impl Model {
    pub fn init(config: &ViewerConfig, _ui_width: usize, ui_height: usize) -> Self {
        let mut model = Self {
            config: config.clone(),
            status: Status::EMPTY,
            cache: SourceCache::new(),
            table: None,
            source_name: String::new(),
            mode: Mode::ByItemName,
            locations: Vec::new(),
            location_idx: 0,
            info_only_by_location: false,
            info_only_by_name: false,
            keyword: String::new(),
            keyword_before_edit: String::new(),
            input: Inputter::default(),
            input_mode: None,
            last_input: InputResult::default(),
            listing: Listing::NoData,
            curser_row: 0,
            page_height: Self::page_height_for(ui_height),
            uidata: UIData::empty(),
            clipboard: None,
        };
        model.refresh();
        model
    }

    fn page_height_for(ui_height: usize) -> usize {
        ui_height.saturating_sub(TABLE_CHROME_HEIGHT).max(1)
    }

    /// Loads the configured default file, or asks for a file when that fails.
    pub fn open_default(&mut self) {
        let path = self.config.default_source.clone();
        if !path.exists() {
            info!("Default source {} not present", path.display());
            self.enter_input_mode(InputMode::OpenFile);
            return;
        }
        match self.cache.get_or_load(&Source::Path(path.clone())) {
            Ok(table) => self.set_table(table, &path.display().to_string()),
            Err(e) => {
                warn!("Reading default source failed: {e}");
                self.set_status_message(format!("讀取預設檔案失敗：{e}"));
                self.enter_input_mode(InputMode::OpenFile);
            }
        }
    }

    /// Reads a user chosen file into memory and loads it.
    pub fn open_upload(&mut self, input: &str) -> Result<(), InventoryError> {
        let loaded = expand_path(input)
            .and_then(|path| Source::upload_from_path(&path))
            .and_then(|source| Ok((self.cache.get_or_load(&source)?, source.name())));
        match loaded {
            Ok((table, name)) => {
                self.set_table(table, &name);
                Ok(())
            }
            Err(e) => {
                if e.is_source_error() {
                    warn!("Reading upload {input} failed: {e}");
                } else {
                    error!("Reading upload {input} failed: {e}");
                }
                self.set_status_message(format!("讀取上傳檔案失敗：{e}"));
                self.enter_input_mode(InputMode::OpenFile);
                Err(e)
            }
        }
    }

    pub fn set_table(&mut self, table: Arc<InventoryTable>, name: &str) {
        self.locations = table.distinct_locations();
        self.location_idx = 0;
        self.curser_row = 0;
        self.source_name = name.to_string();
        self.table = Some(table);
        self.status = Status::READY;
        debug!("{} sources cached in this session", self.cache.len());
        if self.table.as_ref().is_some_and(|t| t.is_empty()) {
            self.set_status_message(format!("Loaded {name}, it has no records"));
        } else {
            self.set_status_message(format!("Loaded {name}"));
        }
        self.refresh();
    }

    pub fn get_uidata(&self) -> &UIData {
        &self.uidata
    }

    pub fn raw_keyevents(&self) -> bool {
        self.input_mode.is_some()
    }

    pub fn quit(&mut self) {
        if !self.cache.is_empty() {
            debug!("Dropping {} cached sources", self.cache.len());
            self.cache.clear();
        }
        self.status = Status::QUITTING;
    }

    fn selected_location(&self) -> Option<&str> {
        self.locations.get(self.location_idx).map(|s| s.as_str())
    }

    fn info_only(&self) -> bool {
        match self.mode {
            Mode::ByLocation => self.info_only_by_location,
            Mode::ByItemName => self.info_only_by_name,
        }
    }

    fn set_status_message(&mut self, message: impl Into<String>) {
        self.uidata.status_message = message.into();
    }

    // Recomputes the current view and the data handed to the ui.
    fn refresh(&mut self) {
        self.listing = match &self.table {
            None => Listing::NoData,
            Some(table) => {
                let listing = match self.mode {
                    Mode::ByLocation => {
                        views::by_location(table, self.selected_location(), self.info_only())
                            .map(Listing::Location)
                    }
                    Mode::ByItemName => views::by_item_name(table, &self.keyword, self.info_only())
                        .map(Listing::Summary),
                };
                listing.unwrap_or_else(Listing::Missing)
            }
        };
        let nrows = self.current_rows().len();
        self.curser_row = self.curser_row.min(nrows.saturating_sub(1));
        self.update_uidata();
    }

    fn current_rows(&self) -> Vec<Vec<String>> {
        match &self.listing {
            Listing::Location(view) => view
                .rows
                .iter()
                .map(|(id, name)| {
                    view.columns
                        .iter()
                        .map(|f| match f {
                            Field::Id => id.clone(),
                            _ => name.clone(),
                        })
                        .collect()
                })
                .collect(),
            Listing::Summary(rows) => rows
                .iter()
                .map(|r| {
                    vec![
                        r.item_name.clone(),
                        r.location_list(),
                        r.location_count.to_string(),
                        r.record_count.to_string(),
                    ]
                })
                .collect(),
            Listing::Missing(_) | Listing::NoData => Vec::new(),
        }
    }

    fn update_uidata(&mut self) {
        let checkbox = if self.info_only() { "[x]" } else { "[ ]" };
        let filter_line = match self.mode {
            Mode::ByLocation => format!(
                "選擇儲存位置：◀ {} ▶   {} {}",
                self.selected_location().unwrap_or("—"),
                checkbox,
                INFO_ONLY_LABEL
            ),
            Mode::ByItemName => format!(
                "搜尋物品名稱（支援關鍵字）：{}   {} {}",
                self.keyword, checkbox, INFO_ONLY_LABEL
            ),
        };
        let (caption, header, notice) = match &self.listing {
            Listing::Location(view) => (
                view.caption(),
                view.columns.iter().map(|f| f.header().to_string()).collect(),
                None,
            ),
            Listing::Summary(rows) => (
                views::summary_caption(rows),
                vec![
                    Field::ItemName.header().to_string(),
                    HEADER_LOCATION_LIST.to_string(),
                    HEADER_LOCATION_COUNT.to_string(),
                    HEADER_RECORD_COUNT.to_string(),
                ],
                None,
            ),
            Listing::Missing(e) => (String::new(), Vec::new(), Some(e.to_string())),
            Listing::NoData => (String::new(), Vec::new(), Some(UPLOAD_PROMPT.to_string())),
        };

        self.uidata.source_name = self.source_name.clone();
        self.uidata.mode = self.mode;
        self.uidata.filter_line = filter_line;
        self.uidata.caption = caption;
        self.uidata.header = header;
        self.uidata.rows = self.current_rows();
        self.uidata.notice = notice;
        self.uidata.selected_row = self.curser_row;
        self.uidata.input = self.input_mode.map(|m| (m, self.last_input.clone()));
    }

    pub fn update(&mut self, message: Option<Message>) -> Result<(), InventoryError> {
        let Some(msg) = message else {
            return Ok(());
        };
        trace!("Update: {:?}", msg);

        if self.uidata.show_popup {
            match msg {
                Message::Quit => self.quit(),
                Message::Exit | Message::Help => self.close_popup(),
                Message::Resize(width, height) => self.ui_resize(width, height),
                _ => (),
            }
            return Ok(());
        }

        match msg {
            Message::Quit => self.quit(),
            Message::RawKey(key) => self.raw_input(key),
            Message::Resize(width, height) => self.ui_resize(width, height),
            Message::Help => self.show_help(),
            Message::OpenFile => self.enter_input_mode(InputMode::OpenFile),
            _ if self.table.is_none() => {
                trace!("No data loaded, ignoring {:?}", msg);
            }
            Message::SwitchMode => self.switch_mode(),
            Message::NextLocation => self.step_location(1),
            Message::PrevLocation => self.step_location(-1),
            Message::ToggleInfoOnly => self.toggle_info_only(),
            Message::MoveUp => self.move_selection_up(1),
            Message::MoveDown => self.move_selection_down(1),
            Message::MovePageUp => self.move_selection_up(self.page_height),
            Message::MovePageDown => self.move_selection_down(self.page_height),
            Message::MoveBeginning => self.move_selection_up(usize::MAX),
            Message::MoveEnd => self.move_selection_down(usize::MAX),
            Message::EditKeyword => {
                if self.mode == Mode::ByItemName {
                    self.enter_input_mode(InputMode::Keyword)
                }
            }
            Message::Export => self.export_summary(),
            Message::CopyRow => self.copy_row(),
            Message::Exit => (),
        }
        Ok(())
    }

    // -------------------- Control handling functions ---------------------- //

    fn ui_resize(&mut self, width: usize, height: usize) {
        trace!("UI was resized to w:{width}, h:{height}");
        self.page_height = Self::page_height_for(height);
    }

    fn show_help(&mut self) {
        self.uidata.popup_message = HELP_TEXT.to_string();
        self.uidata.show_popup = true;
    }

    fn close_popup(&mut self) {
        trace!("Close popup ...");
        self.uidata.show_popup = false;
    }

    fn switch_mode(&mut self) {
        self.mode = match self.mode {
            Mode::ByItemName => Mode::ByLocation,
            Mode::ByLocation => Mode::ByItemName,
        };
        self.curser_row = 0;
        self.refresh();
    }

    fn step_location(&mut self, step: isize) {
        if self.mode != Mode::ByLocation || self.locations.is_empty() {
            return;
        }
        let n = self.locations.len() as isize;
        self.location_idx = (self.location_idx as isize + step).rem_euclid(n) as usize;
        self.curser_row = 0;
        self.refresh();
    }

    fn toggle_info_only(&mut self) {
        match self.mode {
            Mode::ByLocation => self.info_only_by_location = !self.info_only_by_location,
            Mode::ByItemName => self.info_only_by_name = !self.info_only_by_name,
        }
        self.curser_row = 0;
        self.refresh();
    }

    fn move_selection_up(&mut self, size: usize) {
        self.curser_row = self.curser_row.saturating_sub(size);
        self.update_uidata();
    }

    fn move_selection_down(&mut self, size: usize) {
        let last = self.uidata.rows.len().saturating_sub(1);
        self.curser_row = self.curser_row.saturating_add(size).min(last);
        self.update_uidata();
    }

    fn enter_input_mode(&mut self, mode: InputMode) {
        trace!("Entering input mode {:?}", mode);
        self.input_mode = Some(mode);
        match mode {
            InputMode::Keyword => {
                self.keyword_before_edit = self.keyword.clone();
                self.input.set(&self.keyword);
            }
            InputMode::OpenFile => self.input.clear(),
        }
        self.last_input = self.input.get();
        self.update_uidata();
    }

    fn raw_input(&mut self, key: KeyEvent) {
        let Some(mode) = self.input_mode else {
            return;
        };
        self.last_input = self.input.read(key);
        match mode {
            InputMode::Keyword => {
                // The summary follows the keyword while typing.
                self.keyword = if self.last_input.canceled {
                    self.keyword_before_edit.clone()
                } else {
                    self.last_input.input.clone()
                };
                if self.last_input.finished {
                    self.input_mode = None;
                }
                self.curser_row = 0;
                self.refresh();
            }
            InputMode::OpenFile => {
                if self.last_input.finished {
                    self.input_mode = None;
                    let path = self.last_input.input.clone();
                    if !self.last_input.canceled && !path.trim().is_empty() {
                        // Failures are reported in the status line.
                        let _ = self.open_upload(&path);
                        return;
                    }
                }
                self.update_uidata();
            }
        }
    }

    fn export_summary(&mut self) {
        let Listing::Summary(rows) = &self.listing else {
            self.set_status_message("Switch to 依物品名稱彙總 to export the summary");
            return;
        };
        match export::write_summary(&self.config.export_dir, rows) {
            Ok(path) => {
                self.set_status_message(format!("下載彙總（CSV）：{}", path.display()));
            }
            Err(e) => {
                error!("Export failed: {e}");
                self.set_status_message(format!("Export failed: {e}"));
            }
        }
    }

    fn wrap_cell_content(c: &str) -> String {
        let needs_escaping = c.contains('"');
        let needs_wrapping = c.chars().any(|c| c == ',' || c == '\n' || c == '"');
        let mut out = String::from(c);

        if needs_escaping {
            out = out.replace('"', "\"\"");
        }
        if needs_wrapping {
            out = format!("\"{out}\"");
        }
        out
    }

    fn selected_row_text(&self) -> Option<String> {
        self.uidata.rows.get(self.curser_row).map(|row| {
            row.iter()
                .map(|c| Model::wrap_cell_content(c))
                .collect::<Vec<String>>()
                .join(",")
        })
    }

    fn copy_row(&mut self) {
        let Some(text) = self.selected_row_text() else {
            return;
        };
        if self.clipboard.is_none() {
            match Clipboard::new() {
                Ok(clipboard) => self.clipboard = Some(clipboard),
                Err(e) => {
                    debug!("Clipboard unavailable: {:?}", e);
                    self.set_status_message("Clipboard unavailable");
                    return;
                }
            }
        }
        if let Some(clipboard) = self.clipboard.as_mut() {
            match clipboard.set_text(text) {
                Ok(_) => self.set_status_message("Copied row to clipboard."),
                Err(e) => trace!("Error copying to clipboard: {:?}", e),
            }
        }
    }
}
