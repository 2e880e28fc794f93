//! OFX Inspect - CLI tool for examining and re-emitting OFX documents.

use clap::{Parser, ValueEnum};
use std::fs::File;
use std::io::{self, Read, Write};

use ofx_codec::domain::default_registry;
use ofx_codec::domain::investment::{
    BuyStockTransaction, IncomeTransaction, InvestmentTransactionList, SellMutualFundTransaction,
};
use ofx_codec::domain::seclist::SecurityId;
use ofx_codec::domain::signon::{SignonRequest, SignonResponse};
use ofx_codec::{
    unmarshal_any, Aggregate, AggregateMarshaller, Error, OfxVersion, Result,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputKind {
    /// Root tag and a debug dump of the parsed object
    Summary,
    /// Pretty-printed JSON
    Json,
    /// Re-emit as OFX 1.x
    Ofx1,
    /// Re-emit as OFX 2.x
    Ofx2,
}

#[derive(Parser)]
#[command(name = "ofx_inspect")]
#[command(about = "Parse an OFX document and dump or re-emit it", long_about = None)]
struct Cli {
    /// Input file path (or stdin if not provided)
    #[arg(short, long)]
    input: Option<String>,

    /// What to emit
    #[arg(long, value_enum, default_value_t = OutputKind::Summary)]
    format: OutputKind,

    /// Output file path (or stdout if not provided)
    #[arg(short, long)]
    output: Option<String>,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with_writer(io::stderr)
        .init();

    if let Err(e) = run() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    let mut input = Vec::new();
    if let Some(ref input_path) = cli.input {
        File::open(input_path)?.read_to_end(&mut input)?;
    } else {
        io::stdin().read_to_end(&mut input)?;
    }

    let (tag, root) = unmarshal_any(default_registry(), &input)?;

    if let Some(ref output_path) = cli.output {
        let mut file = File::create(output_path)?;
        write_output(&mut file, &tag, root.as_ref(), cli.format)
    } else {
        let mut stdout = io::stdout();
        write_output(&mut stdout, &tag, root.as_ref(), cli.format)
    }
}

fn write_output<W: Write>(
    writer: &mut W,
    tag: &str,
    root: &dyn Aggregate,
    format: OutputKind,
) -> Result<()> {
    match format {
        OutputKind::Summary => {
            writeln!(writer, "root: <{}>", tag)?;
            writeln!(writer, "{:#?}", root)?;
        }
        OutputKind::Json => {
            let json = to_json(root)?;
            writeln!(writer, "{}", json)?;
        }
        OutputKind::Ofx1 => {
            AggregateMarshaller::new(default_registry()).write_to(root, OfxVersion::V1, writer)?;
        }
        OutputKind::Ofx2 => {
            AggregateMarshaller::new(default_registry()).write_to(root, OfxVersion::V2, writer)?;
        }
    }
    Ok(())
}

/// Serialize any of the bundled root types to JSON.
fn to_json(root: &dyn Aggregate) -> Result<String> {
    macro_rules! try_types {
        ($($ty:ty),* $(,)?) => {
            $(
                if let Some(value) = root.as_any().downcast_ref::<$ty>() {
                    return serde_json::to_string_pretty(value)
                        .map_err(|e| Error::Config(e.to_string()));
                }
            )*
        };
    }
    try_types!(
        InvestmentTransactionList,
        BuyStockTransaction,
        SellMutualFundTransaction,
        IncomeTransaction,
        SecurityId,
        SignonRequest,
        SignonResponse,
    );
    Err(Error::Config(
        "no JSON mapping for this aggregate type".to_string(),
    ))
}
