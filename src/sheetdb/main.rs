use clap::Parser;
use colored::*;
use directories::ProjectDirs;
use sheetdb::client::SheetClient;
use sheetdb::commands::{FindOptions, RemoveOptions, UpdateOptions};
use sheetdb::config::SheetDbConfig;
use sheetdb::error::{Result, SheetDbError};
use sheetdb::model::{format_timestamp, Row, WorksheetOptions};
use sheetdb::spreadsheet::Spreadsheet;
use sheetdb::store::fs::FileSheets;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

mod args;
use args::{Cli, Commands};

const DATA_FILENAME: &str = "sheets.json";

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = run(cli).await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "sheetdb=debug" } else { "sheetdb=warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> Result<()> {
    let sheet = open(&cli)?;

    match cli.command {
        Commands::Info => handle_info(&sheet).await,
        Commands::CreateWorksheet { title, rows, cols } => {
            let options = WorksheetOptions {
                row_count: rows,
                col_count: cols,
            };
            let ws = sheet.create_worksheet(&title, &options).await?;
            println!(
                "{} {} ({})",
                "Worksheet ready:".green(),
                ws.title(),
                ws.info().worksheet_id
            );
            Ok(())
        }
        Commands::DropWorksheet { title } => {
            sheet.drop_worksheet(&title).await?;
            println!("{} {}", "Worksheet dropped:".green(), title);
            Ok(())
        }
        Commands::Columns { worksheet } => {
            for column in sheet.worksheet(&worksheet).await?.columns().await? {
                println!("{}", column);
            }
            Ok(())
        }
        Commands::Find {
            worksheet,
            filter,
            skip,
            limit,
            sort,
            descending,
        } => {
            let options = FindOptions {
                skip,
                limit,
                sort,
                descending,
            };
            let rows = sheet
                .worksheet(&worksheet)
                .await?
                .find_json(&parse_json(&filter)?, options)
                .await?;
            print_rows(&rows)
        }
        Commands::Insert {
            worksheet,
            documents,
        } => {
            let rows = sheet
                .worksheet(&worksheet)
                .await?
                .insert_json(&parse_json(&documents)?)
                .await?;
            print_rows(&rows)
        }
        Commands::Update {
            worksheet,
            selector,
            update,
            multiple,
            upsert,
        } => {
            let options = UpdateOptions { multiple, upsert };
            let rows = sheet
                .worksheet(&worksheet)
                .await?
                .update_json(&parse_json(&selector)?, &parse_json(&update)?, options)
                .await?;
            print_rows(&rows)
        }
        Commands::Remove {
            worksheet,
            selector,
            just_one,
        } => {
            let removed = sheet
                .worksheet(&worksheet)
                .await?
                .remove_json(&parse_json(&selector)?, RemoveOptions { just_one })
                .await?;
            println!("{} {}", "Removed rows:".green(), removed);
            Ok(())
        }
    }
}

fn open(cli: &Cli) -> Result<Spreadsheet<FileSheets>> {
    let dirs = ProjectDirs::from("com", "sheetdb", "sheetdb");
    let config_dir = cli
        .config
        .clone()
        .or_else(|| dirs.as_ref().map(|d| d.config_dir().to_path_buf()))
        .unwrap_or_else(|| PathBuf::from("."));
    let config = SheetDbConfig::load(&config_dir)?;

    let data_file = cli
        .data
        .clone()
        .or_else(|| config.data_file.clone())
        .or_else(|| dirs.as_ref().map(|d| d.data_dir().join(DATA_FILENAME)))
        .unwrap_or_else(|| PathBuf::from(DATA_FILENAME));
    tracing::debug!(data = %data_file.display(), config = %config_dir.display(), "opening");

    let mut client = SheetClient::from_config(FileSheets::new(data_file), &config);
    if let Some(token) = cli.token.as_deref().filter(|t| !t.is_empty()) {
        client = client.with_access_token(token);
    }
    Ok(Spreadsheet::open(cli.sheet.clone(), Arc::new(client)))
}

async fn handle_info(sheet: &Spreadsheet<FileSheets>) -> Result<()> {
    let info = sheet.info().await?;
    println!("{} ({})", info.title.bold(), sheet.id());
    if let Some(updated) = info.updated {
        println!("updated {}", format_timestamp(&updated).dimmed());
    }
    for ws in &info.worksheets {
        println!(
            "  {} {} {}x{}",
            ws.title,
            ws.worksheet_id.dimmed(),
            ws.row_count,
            ws.col_count
        );
    }
    Ok(())
}

fn parse_json(text: &str) -> Result<serde_json::Value> {
    serde_json::from_str(text).map_err(SheetDbError::Serialization)
}

fn print_rows(rows: &[Row]) -> Result<()> {
    for row in rows {
        println!("{}", serde_json::to_string(&row.to_json())?);
    }
    Ok(())
}
