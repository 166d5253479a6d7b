use nbdatools::analysis::*;
use nbdatools::config::RunConfig;
use nbdatools::diagnostics::TracingSink;
use nbdatools::errors::*;
use nbdatools::health::HealthTimeline;
use nbdatools::imputation::diagnosis_lag_truth;
use nbdatools::network::TemporalNetwork;
use nbdatools::null_model::mean_jaccard;
use nbdatools::util::*;

use rand::Rng;
use rand_xoshiro::Xoshiro256PlusPlus;
use rand_xoshiro::rand_core::SeedableRng;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    // Read JSON data from file specified in first command-line argument or from stdin
    let args: Vec<String> = std::env::args().collect();
    let json_data = if args.len() > 1 {
        read_data_from_file(&args[1])?
    }
    else {
        read_data_from_stdin()?
    };
    let config = RunConfig::from_json(&json_data)?;

    // If we were given a config file, use its parent as our working directory
    if args.len() > 1 {
        if let Some(parent) = Path::new(&args[1]).parent() {
            if !parent.as_os_str().is_empty() {
                std::env::set_current_dir(parent).map_err(
                    |_| Error::InvalidInputPath(parent.display().to_string())
                )?;
            }
        }
    }

    let start = Instant::now();
    let edges = load_edge_records(&config.edge_path)?;
    let network = TemporalNetwork::build_with_sink(&edges, config.normalize_edge_weight, &TracingSink);
    let diagnoses = load_diagnosis_records(&config.health_path)?;
    let timeline = HealthTimeline::extract(&diagnoses, &config.nodes, config.fill_gaps)?;
    info!(
        timesteps = network.len(), nodes = config.nodes.len(),
        sick_intervals = timeline.sick_interval_count(), "loaded data"
    );

    let rng_seed = config.rng_seed.unwrap_or_else(|| rand::thread_rng().gen());
    let mut rng = Xoshiro256PlusPlus::seed_from_u64(rng_seed);
    let networks = null_network_set(network, config.null_networks, &mut rng, &TracingSink)?;

    let mut features = config.features();
    features.null_comparison = config.null_networks > 0;
    let model = NbdaModel::new(networks, Arc::new(timeline), features, config.priors())?;
    info!(layout = ?model.layout(), seed_date = model.seed_date(), "built model");

    let true_log_likelihood = match &config.truth {
        Some(truth) => log_likelihood_at_truth(&config, &model, truth)?,
        None => None,
    };

    // Write to DB file specified in config file
    // (or use in-memory database if not specified)
    let mut db_connection = match &config.output_path {
        Some(output_path) => {
            let db_path: PathBuf = output_path.into();
            if db_path.exists() {
                return Err(Error::Database(format!("{} already exists", output_path)));
            }
            rusqlite::Connection::open(db_path)?
        },
        None => rusqlite::Connection::open_in_memory()?,
    };

    {
        let db_transaction = db_connection.transaction()?;
        write_tables(&db_transaction, &model, rng_seed, true_log_likelihood)?;
        db_transaction.commit()?;
    }
    info!(elapsed_s = start.elapsed().as_secs_f64(), "done");

    if config.write_to_stdout.unwrap_or(false) {
        info!("writing DB to stdout in JSON format");
        let db_json_data = db_to_json(&db_connection)?;
        println!("{}", serde_json::to_string_pretty(&db_json_data)?);
    }

    Ok(())
}

/// Completes the configured truth with the true lag quantiles and, under
/// null comparison, a model quantile selecting the empirical network.
fn log_likelihood_at_truth(
    config: &RunConfig, model: &NbdaModel, truth: &[f64]
) -> Result<Option<f64>> {
    let mut v = truth.to_vec();
    let features = model.layout().features();
    if features.diagnosis_lag {
        let true_health_path = match &config.true_health_path {
            Some(path) => path,
            None => {
                warn!("diagnosis lag is modeled but no true health file is configured");
                return Ok(None);
            },
        };
        let true_records = load_diagnosis_records(true_health_path)?;
        if let Some(contact_days) = model.contact_days(0) {
            v.extend(diagnosis_lag_truth(contact_days, &true_records)?);
        }
    }
    if features.null_comparison {
        v.push(1.0 / model.networks().len() as f64);
    }

    let params = model.layout().decode(&v)?;
    let log_likelihood = model.evaluate(&params);
    info!(?v, log_likelihood, "log-likelihood at truth");
    Ok(Some(log_likelihood))
}

fn write_tables(
    conn: &rusqlite::Connection,
    model: &NbdaModel,
    rng_seed: u64,
    true_log_likelihood: Option<f64>,
) -> Result<()> {
    create_tables(conn)?;
    write_meta(conn, "rng_seed", rng_seed.to_string())?;
    write_meta(conn, "seed_date", model.seed_date())?;
    write_meta(conn, "time_max", model.time_max())?;
    write_meta(conn, "parameters", model.layout().field_names().join(","))?;
    if let Some(ll) = true_log_likelihood {
        write_meta(conn, "true_log_likelihood", ll)?;
    }

    write_intervals(conn, model.timeline())?;

    let empirical = model.networks().empirical();
    for (index, network) in model.networks().iter().enumerate() {
        write_network_edges(conn, index, network)?;
        if let Some(contact_days) = model.contact_days(index) {
            write_contact_days(conn, index, contact_days)?;
        }
        if index > 0 {
            write_null_network(conn, index, mean_jaccard(empirical, network))?;
        }
    }
    Ok(())
}
