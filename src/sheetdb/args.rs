use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "sheetdb")]
#[command(about = "Query and edit spreadsheet rows with MongoDB-style documents", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Spreadsheet to operate on
    #[arg(short, long, global = true, default_value = "default")]
    pub sheet: String,

    /// Spreadsheet data file (defaults to the configured or per-user one)
    #[arg(long, global = true)]
    pub data: Option<PathBuf>,

    /// Directory holding sheetdb.json
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Access token, required for creating and dropping worksheets
    #[arg(long, global = true)]
    pub token: Option<String>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show the spreadsheet and its worksheets
    Info,

    /// Create a worksheet
    #[command(alias = "mk")]
    CreateWorksheet {
        title: String,

        /// Number of rows
        #[arg(long)]
        rows: Option<usize>,

        /// Number of columns
        #[arg(long)]
        cols: Option<usize>,
    },

    /// Drop a worksheet
    DropWorksheet { title: String },

    /// List the columns of a worksheet
    #[command(alias = "cols")]
    Columns { worksheet: String },

    /// Print matching rows as JSON lines
    #[command(alias = "f")]
    Find {
        worksheet: String,

        /// Filter document (JSON), e.g. '{"age": {"$gt": 30}}'
        #[arg(default_value = "{}")]
        filter: String,

        #[arg(long, default_value_t = 0)]
        skip: usize,

        #[arg(long)]
        limit: Option<usize>,

        /// Column to order by
        #[arg(long)]
        sort: Option<String>,

        #[arg(long)]
        descending: bool,
    },

    /// Insert one document or an array of documents (JSON)
    #[command(alias = "i")]
    Insert { worksheet: String, documents: String },

    /// Update matching rows
    #[command(alias = "u")]
    Update {
        worksheet: String,

        /// Selector document (JSON)
        selector: String,

        /// Update descriptor or replacement document (JSON)
        update: String,

        /// Update every match instead of the first
        #[arg(long)]
        multiple: bool,

        /// Insert when nothing matches
        #[arg(long)]
        upsert: bool,
    },

    /// Remove matching rows
    #[command(alias = "rm")]
    Remove {
        worksheet: String,

        /// Selector document (JSON)
        selector: String,

        /// Remove only the first match
        #[arg(long)]
        just_one: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_find_options() {
        let cli = Cli::parse_from([
            "sheetdb", "--sheet", "s1", "find", "people", r#"{"a": 1}"#, "--skip", "1",
            "--limit", "2", "--descending",
        ]);
        assert_eq!(cli.sheet, "s1");
        match cli.command {
            Commands::Find {
                worksheet,
                filter,
                skip,
                limit,
                descending,
                sort,
            } => {
                assert_eq!(worksheet, "people");
                assert_eq!(filter, r#"{"a": 1}"#);
                assert_eq!((skip, limit, descending, sort), (1, Some(2), true, None));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn global_flags_follow_the_subcommand() {
        let cli = Cli::parse_from(["sheetdb", "rm", "people", "{}", "--just-one", "-v", "--token", "t"]);
        assert!(cli.verbose);
        assert_eq!(cli.token.as_deref(), Some("t"));
        assert!(matches!(cli.command, Commands::Remove { just_one: true, .. }));
    }
}
