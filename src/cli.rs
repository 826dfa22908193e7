use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::model::TemplateKind;
use crate::ocr::EngineKind;

#[derive(Parser, Debug)]
#[command(
    name = "docsnip",
    version,
    about = "Template-driven extraction of tabular data from scanned documents and PDFs"
)]
pub struct Cli {
    #[arg(long, global = true, default_value = "docsnip.json")]
    pub config: PathBuf,

    /// Overrides `workspace_dir` from the configuration file.
    #[arg(long, global = true)]
    pub workspace_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    #[command(subcommand)]
    Template(TemplateCommand),
    Import(ImportArgs),
    Process(ProcessArgs),
    #[command(subcommand)]
    Session(SessionCommand),
    Export(ExportArgs),
    Status(StatusArgs),
}

#[derive(Subcommand, Debug)]
pub enum TemplateCommand {
    Add(TemplateAddArgs),
    List,
    Show(TemplateNameArgs),
    Delete(TemplateNameArgs),
}

#[derive(Args, Debug, Clone)]
pub struct TemplateAddArgs {
    /// Read the whole template from a JSON file instead of the flags below.
    #[arg(long, conflicts_with_all = ["name", "field", "region"])]
    pub from_json: Option<PathBuf>,

    #[arg(long, required_unless_present = "from_json")]
    pub name: Option<String>,

    #[arg(long, value_enum, default_value_t = KindArg::TextParser)]
    pub kind: KindArg,

    #[arg(long, default_value_t = false)]
    pub numeric_optimize: bool,

    /// `Column: pattern`, repeatable. Order defines the output column order.
    #[arg(long = "field")]
    pub field: Vec<String>,

    /// `Column=x,y,width,height` in pixels at the configured OCR resolution.
    #[arg(long = "region")]
    pub region: Vec<String>,
}

#[derive(Args, Debug, Clone)]
pub struct TemplateNameArgs {
    pub name: String,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum KindArg {
    Visual,
    TextParser,
}

impl From<KindArg> for TemplateKind {
    fn from(value: KindArg) -> Self {
        match value {
            KindArg::Visual => TemplateKind::Visual,
            KindArg::TextParser => TemplateKind::TextParser,
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct ImportArgs {
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct ProcessArgs {
    /// Defaults to `default_ocr_engine` from the configuration.
    #[arg(long, value_enum)]
    pub engine: Option<EngineKind>,

    /// Template names to apply, in priority order. Defaults to all templates.
    #[arg(long = "template")]
    pub templates: Vec<String>,

    /// Imported file base names to process. Defaults to every imported file.
    #[arg(long = "file")]
    pub files: Vec<String>,

    /// `name.pdf:1,3-5` restricts the pages processed for one file.
    #[arg(long = "page")]
    pub pages: Vec<String>,
}

#[derive(Subcommand, Debug)]
pub enum SessionCommand {
    Save(SessionSaveArgs),
    Load(SessionLoadArgs),
}

#[derive(Args, Debug, Clone)]
pub struct SessionSaveArgs {
    pub path: PathBuf,

    /// JSON file stored verbatim as the session's view settings.
    #[arg(long)]
    pub view_settings: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct SessionLoadArgs {
    pub path: PathBuf,
}

#[derive(Args, Debug, Clone)]
pub struct ExportArgs {
    #[arg(long, value_enum, default_value_t = ExportFormat::Tsv)]
    pub format: ExportFormat,

    /// Destination file. TSV goes to stdout and SQLite to the exports
    /// directory when omitted.
    #[arg(long)]
    pub output: Option<PathBuf>,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum ExportFormat {
    Tsv,
    Sqlite,
}

#[derive(Args, Debug, Clone)]
pub struct StatusArgs {
    /// Also print the rows of the last run.
    #[arg(long, default_value_t = false)]
    pub rows: bool,
}
