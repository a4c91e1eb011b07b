use std::fs::File;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};
use tracing_error::ErrorLayer;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

mod controller;
mod domain;
mod export;
mod inputter;
mod inventory;
mod model;
mod source;
mod ui;
mod views;

use controller::Controller;
use domain::{InventoryError, ViewerConfig};
use model::{Model, Status};
use source::{Source, SourceCache, expand_path};
use ui::TableUI;

/// Browse the church property inventory by location or by item name.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Inventory .xlsx file, defaults to 教會財產盤點_依空間整理.xlsx
    file: Option<String>,

    /// Directory the CSV summary is written to
    #[arg(long, default_value = ".")]
    export_dir: PathBuf,

    #[arg(long, default_value = "inventory-viewer.log")]
    log_file: PathBuf,

    /// Event poll interval of the ui in milliseconds
    #[arg(long, default_value_t = 100)]
    poll_ms: u64,

    /// Write the item name summary as CSV and exit without starting the ui
    #[arg(long)]
    summary: bool,

    /// Item name keyword for --summary
    #[arg(long)]
    keyword: Option<String>,

    /// Only count IT assets (資訊類產品 = Y) for --summary
    #[arg(long)]
    info_only: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();
    match run(args) {
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
        Ok(_) => ExitCode::SUCCESS,
    }
}

fn init_logging(cfg: &ViewerConfig) -> Result<(), InventoryError> {
    // The terminal belongs to the ui, so logs go to a file.
    let file = File::create(&cfg.log_file)?;
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(Arc::new(file))
                .with_ansi(false)
                .with_filter(filter),
        )
        .with(ErrorLayer::default())
        .init();
    Ok(())
}

fn run(args: Args) -> Result<(), InventoryError> {
    let cfg = ViewerConfig::default()
        .event_poll_time(args.poll_ms)
        .export_dir(args.export_dir.clone())
        .log_file(args.log_file.clone());
    init_logging(&cfg)?;
    info!("Starting inventory viewer with {:?}", cfg);

    if args.summary {
        return run_summary(&cfg, &args);
    }

    let mut terminal = ratatui::init();
    let result = run_ui(&cfg, &args, &mut terminal);
    ratatui::restore();
    if let Err(e) = &result {
        error!("UI stopped: {e}");
    }
    result
}

fn run_ui(
    cfg: &ViewerConfig,
    args: &Args,
    terminal: &mut ratatui::DefaultTerminal,
) -> Result<(), InventoryError> {
    let size = terminal.size()?;
    let mut model = Model::init(cfg, size.width as usize, size.height as usize);
    match &args.file {
        // Shown in the status line on failure, the session keeps running.
        Some(file) => {
            let _ = model.open_upload(file);
        }
        None => model.open_default(),
    }

    let mut ui = TableUI::new();
    let controller = Controller::new(cfg);

    while model.status != Status::QUITTING {
        terminal.draw(|f| ui.draw(&model, f))?;

        let message = controller.handle_event(&model)?;
        model.update(message)?;
    }
    info!("Bye");
    Ok(())
}

fn run_summary(cfg: &ViewerConfig, args: &Args) -> Result<(), InventoryError> {
    let source = match &args.file {
        Some(file) => Source::Path(expand_path(file)?),
        None => Source::Path(cfg.default_source.clone()),
    };
    let table = SourceCache::new().get_or_load(&source)?;
    let keyword = args.keyword.as_deref().unwrap_or_default();
    let rows = views::by_item_name(&table, keyword, args.info_only)
        .map_err(|e| InventoryError::Export(e.to_string()))?;
    let path = export::write_summary(&cfg.export_dir, &rows)?;
    println!("{} ({})", path.display(), views::summary_caption(&rows));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_summary_flags() {
        let args = Args::parse_from([
            "inventory-viewer",
            "stock.xlsx",
            "--summary",
            "--keyword",
            "椅",
            "--info-only",
        ]);
        assert_eq!(args.file.as_deref(), Some("stock.xlsx"));
        assert!(args.summary && args.info_only);
        assert_eq!(args.keyword.as_deref(), Some("椅"));
        assert_eq!(args.poll_ms, 100);
    }

    #[test]
    fn headless_summary_writes_csv() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("inventory.xlsx");
        std::fs::write(&file, inventory::tests::sample_workbook()).unwrap();

        let args = Args::parse_from([
            "inventory-viewer".to_string(),
            file.display().to_string(),
            "--summary".to_string(),
        ]);
        let cfg = ViewerConfig::default().export_dir(dir.path());
        run_summary(&cfg, &args).unwrap();
        assert!(dir.path().join(domain::EXPORT_FILE_NAME).exists());
    }
}
