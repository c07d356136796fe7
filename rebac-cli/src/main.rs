use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use error_common::{Classify, ErrorClass, ErrorReport};
use rebac_engine::{
    AclService, AuthorizationEngine, AuthzError, CheckRequest, EngineConfig, ExpandRequest,
    InMemoryTupleRepository, ObjectRef, SubjectRef, WriteRequest,
};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{debug, Level};
use tracing_subscriber::{
    fmt::{self, time::ChronoUtc},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

mod input;

const EXIT_DENIED: u8 = 1;
const EXIT_FAILURE: u8 = 2;
const EXIT_BAD_REQUEST: u8 = 3;

/// Relationship-based authorization tooling
#[derive(Parser, Debug)]
#[command(name = "rebac", version)]
#[command(about = "Validate authorization schemas and evaluate permission checks offline")]
struct Cli {
    /// Engine configuration file (REBAC__* environment variables override it)
    #[arg(short, long, global = true, env = "REBAC_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

/// The schema and tuples a command evaluates against
#[derive(Args, Debug)]
struct ModelArgs {
    /// Schema file, DSL unless the extension says YAML or JSON. Defaults to the dashboard schema
    #[arg(short, long)]
    schema: Option<PathBuf>,

    /// YAML list of tuples to load before evaluating
    #[arg(short, long)]
    tuples: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Compile a schema and print its types and relations
    Validate {
        #[arg(short, long, required_unless_present = "builtin")]
        schema: Option<PathBuf>,

        /// Validate the built-in dashboard schema
        #[arg(long, conflicts_with = "schema")]
        builtin: bool,
    },
    /// Check whether a subject holds a relation on an object
    Check {
        #[command(flatten)]
        model: ModelArgs,

        /// Object as type:id
        object: String,

        relation: String,

        /// Subject as type:id or type:id#relation
        subject: String,

        /// Request context as a JSON object
        #[arg(long)]
        context: Option<String>,
    },
    /// List every subject holding a relation on an object
    Expand {
        #[command(flatten)]
        model: ModelArgs,

        object: String,

        relation: String,

        #[arg(long)]
        context: Option<String>,

        /// Print the expansion tree as JSON instead of subjects
        #[arg(long)]
        tree: bool,
    },
    /// Print the managed permissions on an object
    Acl {
        #[command(flatten)]
        model: ModelArgs,

        object: String,

        /// Caller; must hold permissions_read on the object
        #[arg(long = "as", value_name = "SUBJECT")]
        caller: String,

        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(err) = init_tracing(cli.verbose, cli.json_logs) {
        eprintln!("Error: failed to initialize logging: {:#}", err);
        return ExitCode::from(EXIT_FAILURE);
    }

    let json_logs = cli.json_logs;
    match run(cli).await {
        Ok(code) => code,
        Err(err) => {
            report_error(&err, json_logs);
            ExitCode::from(exit_code_for(&err))
        }
    }
}

fn init_tracing(verbose: bool, json_logs: bool) -> Result<()> {
    let level = if verbose { Level::DEBUG } else { Level::WARN };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("rebac={},rebac_engine={}", level, level).into());

    // Logs go to stderr so stdout carries only command output
    if json_logs {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_timer(ChronoUtc::rfc_3339())
                    .with_ansi(false)
                    .with_writer(std::io::stderr)
                    .json(),
            )
            .try_init()?;
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_timer(ChronoUtc::rfc_3339())
                    .with_writer(std::io::stderr),
            )
            .try_init()?;
    }

    Ok(())
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let config = match &cli.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::from_env()?,
    };
    debug!("Engine configuration: {:?}", config);

    match cli.command {
        Command::Validate { schema, .. } => {
            let compiled = input::load_schema(schema.as_deref())?;
            for type_name in compiled.type_names() {
                println!("type {}", type_name);
                let object_type = compiled.object_type(type_name)?;
                for relation in object_type.relation_names() {
                    if let Some(expression) = object_type.relation(relation) {
                        println!("  define {}: {}", relation, expression);
                    }
                }
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Check {
            model,
            object,
            relation,
            subject,
            context,
        } => {
            let engine = load_engine(&model, config).await?;
            let request = CheckRequest::new(object.parse()?, &relation, subject.parse()?)
                .with_context(input::parse_context(context.as_deref())?);

            let response = engine.check_request(&request).await?;
            debug!("{} resolved {} nodes", request, response.resolved_nodes);
            if response.allowed {
                println!("allowed");
                Ok(ExitCode::SUCCESS)
            } else {
                println!("denied");
                Ok(ExitCode::from(EXIT_DENIED))
            }
        }
        Command::Expand {
            model,
            object,
            relation,
            context,
            tree,
        } => {
            let engine = load_engine(&model, config).await?;
            let request = ExpandRequest {
                object: object.parse()?,
                relation,
                context: input::parse_context(context.as_deref())?,
            };

            for line in expand_output(&engine, &request, tree).await? {
                println!("{}", line);
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Acl {
            model,
            object,
            caller,
            json,
        } => {
            let engine = Arc::new(load_engine(&model, config).await?);
            let object: ObjectRef = object.parse()?;
            let caller: SubjectRef = caller.parse()?;

            let entries = AclService::new(engine).list(&object, &caller).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&entries)?);
            } else {
                for entry in &entries {
                    println!("{}\t{}", entry.subject()?, entry.permission);
                }
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn load_engine(model: &ModelArgs, config: EngineConfig) -> Result<AuthorizationEngine> {
    let schema = Arc::new(input::load_schema(model.schema.as_deref())?);
    let tuples = input::load_tuples(model.tuples.as_deref())?;
    debug!("Loaded {} tuples", tuples.len());

    let repository = Arc::new(InMemoryTupleRepository::new());
    let engine = AuthorizationEngine::new(repository, schema, config)?;
    engine
        .batch_write(WriteRequest {
            writes: tuples,
            deletes: Vec::new(),
        })
        .await?;
    Ok(engine)
}

/// Subjects one per line, or the expansion tree as pretty JSON
async fn expand_output(
    engine: &AuthorizationEngine,
    request: &ExpandRequest,
    tree: bool,
) -> Result<Vec<String>> {
    if tree {
        let tree = engine.expand_tree(request).await?;
        return Ok(vec![serde_json::to_string_pretty(&tree)?]);
    }

    Ok(engine
        .expand_with_context(&request.object, &request.relation, &request.context)
        .await?
        .iter()
        .map(ToString::to_string)
        .collect())
}

fn engine_error(err: &anyhow::Error) -> Option<&AuthzError> {
    err.chain().find_map(|cause| cause.downcast_ref::<AuthzError>())
}

/// Engine errors are reported with their class and code; JSON mode emits
/// the same body an API consumer would receive
fn report_error(err: &anyhow::Error, json_logs: bool) {
    match engine_error(err) {
        Some(cause) if json_logs => match serde_json::to_string(&ErrorReport::from_error(cause)) {
            Ok(body) => eprintln!("{}", body),
            Err(_) => eprintln!("Error: {:#}", err),
        },
        Some(cause) => eprintln!("Error [{}]: {:#}", cause.code(), err),
        None => eprintln!("Error: {:#}", err),
    }
}

/// Malformed requests exit with a distinct code so scripts can tell them
/// apart from a denial
fn exit_code_for(err: &anyhow::Error) -> u8 {
    let bad_request =
        engine_error(err).is_some_and(|cause| cause.class() == ErrorClass::BadRequest);

    if bad_request {
        EXIT_BAD_REQUEST
    } else {
        EXIT_FAILURE
    }
}
