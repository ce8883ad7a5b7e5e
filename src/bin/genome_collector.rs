use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand, ValueEnum};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use genome_collector::collection::Collection;
use genome_collector::config::{CallerOverrides, CollectionConfig, ConfigLoader, EnvOverrides};
use genome_collector::domain::{AssemblySelector, DataType, Taxid};
use genome_collector::error::CollectorError;
use genome_collector::ncbi::NcbiHttpClient;
use genome_collector::output::{EnsureResult, JsonOutput, ListResult, RecordSummary, RemoveResult};
use genome_collector::query::{QueryInput, QueryRequest};
use genome_collector::tools::SystemToolRunner;

#[derive(Parser)]
#[command(name = "genome-collector")]
#[command(about = "Download NCBI genomes by taxid and build BLAST/Bowtie databases on demand")]
#[command(version, author)]
struct Cli {
    /// Base directory holding collections (overrides GENOME_COLLECTOR_DATA_DIR).
    #[arg(long, global = true)]
    data_dir: Option<String>,

    #[arg(long, global = true)]
    collection: Option<String>,

    /// JSON config file (default: ./genome-collector.json when present).
    #[arg(long, global = true)]
    config: Option<String>,

    /// Never touch the network; fail on anything not cached.
    #[arg(long, global = true)]
    offline: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Ensure a data file is cached and print its path")]
    Data(DataArgs),
    #[command(about = "Parse a cached FASTA or GenBank file and list its records")]
    Records(RecordsArgs),
    #[command(about = "Show (and optionally re-fetch) the metadata of a taxid")]
    Info(InfoArgs),
    #[command(about = "Build a BLAST database for a taxid")]
    BlastDb(BlastDbArgs),
    #[command(about = "Build a Bowtie index for a taxid")]
    BowtieIndex(BowtieArgs),
    #[command(about = "Run a BLAST search against a taxid's database")]
    Blast(BlastArgs),
    #[command(about = "List cached taxids")]
    List(ListArgs),
    #[command(about = "Remove cached files of a taxid")]
    Remove(RemoveArgs),
    #[command(about = "Remove every cached taxid in the collection")]
    Clear,
    #[command(about = "Show which external tools are available")]
    Tools,
}

#[derive(Args)]
struct DataArgs {
    taxid: Taxid,
    #[arg(default_value = "genomic_fasta")]
    data_type: DataType,
}

#[derive(Args)]
struct RecordsArgs {
    taxid: Taxid,
    #[arg(default_value = "genomic_genbank")]
    data_type: DataType,
}

#[derive(Args)]
struct InfoArgs {
    taxid: Taxid,
    /// Re-fetch, picking an assembly id or `#N` when NCBI lists several.
    #[arg(long)]
    assembly: Option<String>,
    #[arg(long)]
    refresh: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum DbKind {
    Nucl,
    Prot,
}

impl DbKind {
    fn data_type(self) -> DataType {
        match self {
            DbKind::Nucl => DataType::NuclBlastdb,
            DbKind::Prot => DataType::ProtBlastdb,
        }
    }
}

#[derive(Args)]
struct BlastDbArgs {
    taxid: Taxid,
    #[arg(value_enum, default_value = "nucl")]
    db_type: DbKind,
    /// Rebuild even if the database exists.
    #[arg(long)]
    force: bool,
}

#[derive(Args)]
struct BowtieArgs {
    taxid: Taxid,
    /// Bowtie generation: 1 or 2.
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u8).range(1..=2))]
    bowtie: u8,
}

#[derive(Args)]
struct BlastArgs {
    taxid: Taxid,
    #[arg(value_enum)]
    db_type: DbKind,
    #[arg(long, conflicts_with = "sequence", required_unless_present = "sequence")]
    query: Option<PathBuf>,
    #[arg(long)]
    sequence: Option<String>,
    /// BLAST program (default: blastn for nucl, blastp for prot).
    #[arg(long)]
    program: Option<String>,
    /// Extra arguments passed to the BLAST program as-is.
    #[arg(last = true)]
    extra: Vec<String>,
}

#[derive(Args)]
struct ListArgs {
    #[arg(long)]
    data_type: Option<DataType>,
    /// Print taxids with their scientific names.
    #[arg(long, conflicts_with = "data_type")]
    names: bool,
}

#[derive(Args)]
struct RemoveArgs {
    taxid: Taxid,
    #[arg(long)]
    data_type: Option<DataType>,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(error) = report.downcast_ref::<CollectorError>() {
            return ExitCode::from(map_exit_code(error));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &CollectorError) -> u8 {
    match error {
        CollectorError::InvalidDataType(_)
        | CollectorError::InvalidTaxid(_)
        | CollectorError::InvalidAssemblySelector(_)
        | CollectorError::IdentifierNotFound { .. }
        | CollectorError::AmbiguousAssembly { .. }
        | CollectorError::UnknownAssembly { .. }
        | CollectorError::NotCached { .. }
        | CollectorError::MissingConfig(_) => 2,
        CollectorError::Network { .. }
        | CollectorError::NcbiStatus { .. }
        | CollectorError::ToolNotFound { .. }
        | CollectorError::BuildFailed { .. }
        | CollectorError::QueryFailed { .. } => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let overrides = CallerOverrides {
        data_dir: cli.data_dir.clone(),
        collection: cli.collection.clone(),
        offline: cli.offline,
    };
    let config = ConfigLoader::resolve(cli.config.as_deref(), &EnvOverrides::from_env(), &overrides)?;

    if let Commands::Tools = cli.command {
        let info = SystemToolRunner::tool_info(&config.tools);
        return JsonOutput::print_tools(&info).into_diagnostic();
    }

    let collection = open_collection(&config)?;
    run_command(cli.command, &collection)
}

fn open_collection(
    config: &CollectionConfig,
) -> miette::Result<Collection<NcbiHttpClient, SystemToolRunner>> {
    let ncbi = NcbiHttpClient::new(config.ncbi.clone())?;
    Ok(Collection::new(config, ncbi, SystemToolRunner::new()))
}

fn run_command(
    command: Commands,
    collection: &Collection<NcbiHttpClient, SystemToolRunner>,
) -> miette::Result<()> {
    match command {
        Commands::Data(args) => {
            let path = collection.ensure(&args.taxid, args.data_type)?;
            let result = EnsureResult::new(args.taxid, args.data_type, path).into_diagnostic()?;
            JsonOutput::print_ensure(&result).into_diagnostic()
        }
        Commands::Records(args) => {
            let records = collection.records(&args.taxid, args.data_type)?;
            let summaries = records.iter().map(RecordSummary::from).collect::<Vec<_>>();
            JsonOutput::print_records(&summaries).into_diagnostic()
        }
        Commands::Info(args) => {
            let record = if args.refresh || args.assembly.is_some() {
                let selector = args
                    .assembly
                    .as_deref()
                    .map(str::parse::<AssemblySelector>)
                    .transpose()?;
                collection.refresh_metadata(&args.taxid, selector.as_ref())?
            } else {
                collection.metadata(&args.taxid)?
            };
            JsonOutput::print_metadata(&record).into_diagnostic()
        }
        Commands::BlastDb(args) => {
            let data_type = args.db_type.data_type();
            if args.force {
                collection.rebuild_database(&args.taxid, data_type)?;
            }
            let stem = collection.build_database(&args.taxid, data_type)?;
            let result = EnsureResult::new(args.taxid, data_type, stem).into_diagnostic()?;
            JsonOutput::print_ensure(&result).into_diagnostic()
        }
        Commands::BowtieIndex(args) => {
            let data_type = if args.bowtie == 2 {
                DataType::Bowtie2Index
            } else {
                DataType::Bowtie1Index
            };
            let stem = collection.build_database(&args.taxid, data_type)?;
            let result = EnsureResult::new(args.taxid, data_type, stem).into_diagnostic()?;
            JsonOutput::print_ensure(&result).into_diagnostic()
        }
        Commands::Blast(args) => {
            let query = match (args.query, args.sequence) {
                (Some(path), _) => QueryInput::File(path),
                (None, Some(sequence)) => QueryInput::Sequence(sequence),
                (None, None) => {
                    return Err(miette::Report::msg("either --query or --sequence is required"));
                }
            };
            let request = QueryRequest {
                query,
                program: args.program,
                extra_args: args.extra,
            };
            let stdout = collection.query(&args.taxid, args.db_type.data_type(), &request)?;
            print!("{stdout}");
            Ok(())
        }
        Commands::List(args) => {
            if args.names {
                let names = collection.list_names()?;
                return JsonOutput::print_names(&names).into_diagnostic();
            }
            let taxids = collection.list_cached(args.data_type)?;
            JsonOutput::print_list(&ListResult {
                data_type: args.data_type,
                taxids,
            })
            .into_diagnostic()
        }
        Commands::Remove(args) => {
            let removed = collection.remove(&args.taxid, args.data_type)?;
            JsonOutput::print_remove(&RemoveResult {
                taxid: Some(args.taxid),
                data_type: args.data_type,
                removed: removed.into_iter().map(|path| path.to_string()).collect(),
            })
            .into_diagnostic()
        }
        Commands::Clear => {
            let removed = collection.clear()?;
            JsonOutput::print_remove(&RemoveResult {
                taxid: None,
                data_type: None,
                removed: removed.into_iter().map(|path| path.to_string()).collect(),
            })
            .into_diagnostic()
        }
        Commands::Tools => Ok(()),
    }
}
