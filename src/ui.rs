use ratatui::{
    Frame,
    layout::{Constraint, Flex, Layout, Rect},
    style::{Style, Stylize},
    symbols::border,
    text::{Line, Span},
    widgets::{Block, Cell, Clear, Paragraph, Row, Table, TableState, Tabs, Wrap},
};

use crate::domain::{InputMode, Mode, PAGE_TITLE};
use crate::model::{Model, UIData};

/// Rows taken by everything around the table body.
pub const TABLE_CHROME_HEIGHT: usize = 8;
const POPUP_WIDTH: u16 = 64;
const POPUP_HEIGHT: u16 = 14;

#[derive(Default)]
pub struct TableUI {
    table_state: TableState,
}

impl TableUI {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn draw(&mut self, model: &Model, frame: &mut Frame) {
        let uidata = model.get_uidata();
        let [title_area, tabs_area, filter_area, caption_area, body_area, status_area] =
            Layout::vertical([
                Constraint::Length(1),
                Constraint::Length(1),
                Constraint::Length(1),
                Constraint::Length(1),
                Constraint::Min(3),
                Constraint::Length(1),
            ])
            .areas(frame.area());

        let title = Line::from(vec![
            PAGE_TITLE.bold(),
            "  ".into(),
            uidata.source_name.clone().yellow(),
        ]);
        frame.render_widget(Paragraph::new(title), title_area);

        let tabs = Tabs::new(vec![Mode::ByItemName.title(), Mode::ByLocation.title()])
            .select(uidata.mode.index())
            .highlight_style(Style::new().bold().reversed());
        frame.render_widget(tabs, tabs_area);

        frame.render_widget(Paragraph::new(self.filter_line(uidata)), filter_area);
        frame.render_widget(Paragraph::new(uidata.caption.clone().bold()), caption_area);

        match &uidata.notice {
            Some(notice) => self.draw_notice(notice, frame, body_area),
            None => self.draw_table(uidata, frame, body_area),
        }

        frame.render_widget(Paragraph::new(self.status_line(uidata)), status_area);

        if uidata.show_popup {
            self.draw_popup(&uidata.popup_message, frame);
        }
    }

    fn filter_line(&self, uidata: &UIData) -> Line<'static> {
        match &uidata.input {
            Some((InputMode::Keyword, input)) => {
                let mut spans = vec![Span::from("搜尋物品名稱（支援關鍵字）：")];
                spans.extend(Self::input_spans(&input.input, input.curser_pos));
                Line::from(spans)
            }
            _ => Line::from(uidata.filter_line.clone()),
        }
    }

    fn status_line(&self, uidata: &UIData) -> Line<'static> {
        match &uidata.input {
            Some((InputMode::OpenFile, input)) => Line::from(
                vec!["上傳 .xlsx 檔: ".blue().bold()]
                    .into_iter()
                    .chain(Self::input_spans(&input.input, input.curser_pos))
                    .collect::<Vec<_>>(),
            ),
            _ => Line::from(vec![
                uidata.status_message.clone().into(),
                "   ".into(),
                "<?>".blue().bold(),
                " help".into(),
            ]),
        }
    }

    fn input_spans(input: &str, curser_pos: usize) -> Vec<Span<'static>> {
        let before: String = input.chars().take(curser_pos).collect();
        let at: String = input.chars().skip(curser_pos).take(1).collect();
        let after: String = input.chars().skip(curser_pos + 1).collect();
        let at = if at.is_empty() { " ".to_string() } else { at };
        vec![before.into(), at.reversed(), after.into()]
    }

    fn draw_notice(&self, notice: &str, frame: &mut Frame, area: Rect) {
        let block = Block::bordered().border_set(border::ROUNDED);
        let paragraph = Paragraph::new(notice.to_string().cyan())
            .wrap(Wrap { trim: true })
            .block(block);
        frame.render_widget(paragraph, area);
    }

    fn draw_table(&mut self, uidata: &UIData, frame: &mut Frame, area: Rect) {
        let header = Row::new(uidata.header.iter().map(|h| Cell::from(h.clone().bold())));
        let widths: Vec<Constraint> = match uidata.header.len() {
            4 => vec![
                Constraint::Percentage(30),
                Constraint::Percentage(50),
                Constraint::Percentage(10),
                Constraint::Percentage(10),
            ],
            2 => vec![Constraint::Length(10), Constraint::Fill(1)],
            n => vec![Constraint::Fill(1); n.max(1)],
        };
        let rows = uidata
            .rows
            .iter()
            .map(|r| Row::new(r.iter().map(|c| Cell::from(c.clone()))));

        let table = Table::new(rows, widths)
            .header(header)
            .row_highlight_style(Style::new().reversed())
            .block(Block::bordered().border_set(border::PLAIN));

        self.table_state.select(if uidata.rows.is_empty() {
            None
        } else {
            Some(uidata.selected_row)
        });
        frame.render_stateful_widget(table, area, &mut self.table_state);
    }

    fn draw_popup(&self, message: &str, frame: &mut Frame) {
        let area = Self::centered(frame.area(), POPUP_WIDTH, POPUP_HEIGHT);
        let block = Block::bordered()
            .title(Line::from(" Help ".bold()).centered())
            .title_bottom(Line::from(vec![" Close ".into(), "<Esc> ".blue().bold()]).centered())
            .border_set(border::THICK);
        frame.render_widget(Clear, area);
        frame.render_widget(Paragraph::new(message.to_string()).block(block), area);
    }

    fn centered(area: Rect, width: u16, height: u16) -> Rect {
        let [area] = Layout::horizontal([Constraint::Length(width)])
            .flex(Flex::Center)
            .areas(area);
        let [area] = Layout::vertical([Constraint::Length(height)])
            .flex(Flex::Center)
            .areas(area);
        area
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Message, ViewerConfig};
    use crate::inventory::tests::{SAMPLE, table};
    use ratatui::{Terminal, backend::TestBackend};
    use std::sync::Arc;

    fn render(model: &Model) -> String {
        let mut terminal = Terminal::new(TestBackend::new(100, 20)).unwrap();
        let mut ui = TableUI::new();
        terminal.draw(|f| ui.draw(model, f)).unwrap();
        terminal
            .backend()
            .buffer()
            .content()
            .iter()
            .map(|c| c.symbol())
            .collect()
    }

    #[test]
    fn renders_summary_rows() {
        let mut model = Model::init(&ViewerConfig::default(), 100, 20);
        model.set_table(Arc::new(table(SAMPLE)), "test.xlsx");
        let screen = render(&model);
        assert!(screen.contains("Chair"));
        assert!(screen.contains("Lamp"));
        assert!(screen.contains("test.xlsx"));
    }

    #[test]
    fn renders_notice_without_data() {
        let model = Model::init(&ViewerConfig::default(), 100, 20);
        let screen = render(&model);
        assert!(screen.contains("Excel"));
        assert!(!screen.contains("Chair"));
    }

    #[test]
    fn renders_help_popup() {
        let mut model = Model::init(&ViewerConfig::default(), 100, 20);
        model.update(Some(Message::Help)).unwrap();
        assert!(render(&model).contains("Help"));
    }
}
