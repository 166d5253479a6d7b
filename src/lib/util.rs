use crate::errors::*;
use crate::health::{DiagnosisRecord, HealthState, HealthTimeline};
use crate::imputation::ContactDayList;
use crate::network::{Day, EdgeRecord, TemporalNetwork};

use indexmap::IndexMap;
use rusqlite::types::ValueRef;
use std::fs::File;
use std::io::Read;
use std::iter::FromIterator;
use std::path::Path;
use unindent::unindent;

const INTERVALS_SQL: &str = "INSERT INTO Intervals VALUES (?,?,?,?);";
const CONTACT_DAYS_SQL: &str = "INSERT INTO ContactDays VALUES (?,?,?,?,?);";
const NETWORK_EDGES_SQL: &str = "INSERT INTO NetworkEdges VALUES (?,?,?,?,?);";
const NULL_NETWORKS_SQL: &str = "INSERT INTO NullNetworks VALUES (?,?);";

/// Tables written by [`create_tables`], with their columns in order.
pub const TABLES: &[(&str, &[&str])] = &[
    ("Meta", &["key", "value"]),
    ("Intervals", &["node", "state", "start_day", "end_day"]),
    ("ContactDays", &["network", "node", "interval_start", "interval_end", "day"]),
    ("NetworkEdges", &["network", "timestep", "node_a", "node_b", "weight"]),
    ("NullNetworks", &["network", "mean_jaccard"]),
];

pub fn read_data_from_stdin() -> Result<String> {
    let mut data = String::new();
    std::io::stdin().read_to_string(&mut data).map_err(
        |_| Error::InputReadFailure
    )?;
    Ok(data)
}

pub fn read_data_from_file(path_str: &str) -> Result<String> {
    let mut file = open_file(path_str)?;
    let mut data = String::new();
    file.read_to_string(&mut data).map_err(
        |_| Error::InputReadFailure
    )?;
    Ok(data)
}

fn open_file(path_str: &str) -> Result<File> {
    let path = Path::new(path_str).canonicalize().map_err(
        |_| Error::InvalidInputPath(path_str.into())
    )?;
    File::open(&path).map_err(
        |_| Error::InvalidInputFile(path_str.into())
    )
}

fn csv_reader<R: Read>(reader: R) -> csv::Reader<R> {
    csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(reader)
}

fn malformed(source_name: &str, line: u64, description: String) -> Error {
    Error::MalformedRecord { source_name: source_name.into(), line, description }
}

/// Deserializes every data row of `reader` (after its header) positionally.
fn read_rows<R, T>(reader: R, source_name: &str) -> Result<Vec<(u64, T)>>
where
    R: Read,
    T: serde::de::DeserializeOwned,
{
    let mut rows = Vec::new();
    for result in csv_reader(reader).records() {
        let record = result.map_err(|e| {
            let line = e.position().map(|p| p.line()).unwrap_or(0);
            malformed(source_name, line, format!("{}", e))
        })?;
        let line = record.position().map(|p| p.line()).unwrap_or(0);
        let row: T = record.deserialize(None).map_err(
            |e| malformed(source_name, line, format!("{}", e))
        )?;
        rows.push((line, row));
    }
    Ok(rows)
}

/// Edge list rows `node_a,node_b,weight,timestep`.
pub fn read_edge_records<R: Read>(reader: R, source_name: &str) -> Result<Vec<EdgeRecord>> {
    let rows: Vec<(u64, (String, String, f64, Day))> = read_rows(reader, source_name)?;
    rows.into_iter().map(|(line, (node_a, node_b, weight, timestep))| {
        if weight < 0.0 || !weight.is_finite() {
            return Err(malformed(source_name, line, format!("invalid edge weight {}", weight)));
        }
        Ok(EdgeRecord { node_a, node_b, weight, timestep })
    }).collect()
}

/// Diagnosis rows `node_id,timestep,state`.
pub fn read_diagnosis_records<R: Read>(
    reader: R, source_name: &str
) -> Result<Vec<DiagnosisRecord>> {
    let rows: Vec<(u64, (String, Day, u8))> = read_rows(reader, source_name)?;
    rows.into_iter().map(|(line, (node, timestep, code))| {
        let state = HealthState::from_code(code).ok_or_else(|| {
            malformed(source_name, line, format!("unknown health state {}", code))
        })?;
        Ok(DiagnosisRecord { node, timestep, state })
    }).collect()
}

pub fn load_edge_records(path_str: &str) -> Result<Vec<EdgeRecord>> {
    read_edge_records(open_file(path_str)?, path_str)
}

pub fn load_diagnosis_records(path_str: &str) -> Result<Vec<DiagnosisRecord>> {
    read_diagnosis_records(open_file(path_str)?, path_str)
}

pub fn create_tables(conn: &rusqlite::Connection) -> Result<()> {
    conn.execute_batch(&unindent("
        CREATE TABLE Meta (key, value);
        CREATE TABLE Intervals (node TEXT, state INTEGER, start_day INTEGER, end_day INTEGER);
        CREATE TABLE ContactDays (
            network INTEGER, node TEXT, interval_start INTEGER, interval_end INTEGER, day INTEGER
        );
        CREATE TABLE NetworkEdges (
            network INTEGER, timestep INTEGER, node_a TEXT, node_b TEXT, weight REAL
        );
        CREATE TABLE NullNetworks (network INTEGER NOT NULL PRIMARY KEY, mean_jaccard REAL);
    "))?;
    Ok(())
}

pub fn write_meta<T: rusqlite::ToSql>(
    conn: &rusqlite::Connection, key: &str, value: T
) -> Result<()> {
    conn.execute("INSERT INTO Meta VALUES (?, ?);", rusqlite::params![key, value])?;
    Ok(())
}

pub fn write_intervals(conn: &rusqlite::Connection, timeline: &HealthTimeline) -> Result<()> {
    let mut stmt = conn.prepare_cached(INTERVALS_SQL)?;
    for state in &[HealthState::Healthy, HealthState::Sick] {
        for (node, interval) in timeline.intervals_in(*state) {
            stmt.execute(rusqlite::params![
                node, i64::from(state.code()), interval.start, interval.end
            ])?;
        }
    }
    Ok(())
}

pub fn write_contact_days(
    conn: &rusqlite::Connection, network: usize, contact_days: &ContactDayList
) -> Result<()> {
    let mut stmt = conn.prepare_cached(CONTACT_DAYS_SQL)?;
    for (key, days) in contact_days {
        for day in days {
            stmt.execute(rusqlite::params![
                network as i64, key.node, key.interval.start, key.interval.end, *day
            ])?;
        }
    }
    Ok(())
}

pub fn write_network_edges(
    conn: &rusqlite::Connection, network_index: usize, network: &TemporalNetwork
) -> Result<()> {
    let mut stmt = conn.prepare_cached(NETWORK_EDGES_SQL)?;
    for edge in network.to_edge_records() {
        stmt.execute(rusqlite::params![
            network_index as i64, edge.timestep, edge.node_a, edge.node_b, edge.weight
        ])?;
    }
    Ok(())
}

pub fn write_null_network(
    conn: &rusqlite::Connection, network_index: usize, mean_jaccard: f64
) -> Result<()> {
    conn.execute(NULL_NETWORKS_SQL, rusqlite::params![network_index as i64, mean_jaccard])?;
    Ok(())
}

/// One JSON array per column.
pub fn db_table_to_json_object(
    conn: &rusqlite::Connection, table_name: &str, column_names: &[&str]
) -> Result<serde_json::Value> {
    let mut columns = IndexMap::new();
    for c in column_names {
        let mut stmt = conn.prepare(&format!("SELECT {} FROM {};", c, table_name))?;
        let values = stmt.query_map(rusqlite::params![], |row| {
            Ok(
                match row.get_raw(0) {
                    ValueRef::Null | ValueRef::Blob(_) => {
                        serde_json::Value::Null
                    },
                    ValueRef::Integer(val) => {
                        val.into()
                    },
                    ValueRef::Real(val) => {
                        val.into()
                    },
                    ValueRef::Text(val) => {
                        serde_json::Value::String(String::from_utf8_lossy(val).into_owned())
                    },
                }
            )
        })?.collect::<rusqlite::Result<Vec<_>>>()?;
        columns.insert(String::from(*c), serde_json::Value::Array(values));
    }
    Ok(serde_json::Value::Object(serde_json::Map::from_iter(columns)))
}

/// Every table of [`TABLES`], keyed by name.
pub fn db_to_json(conn: &rusqlite::Connection) -> Result<serde_json::Value> {
    let mut tables = IndexMap::new();
    for (table_name, column_names) in TABLES {
        tables.insert(
            String::from(*table_name),
            db_table_to_json_object(conn, table_name, column_names)?
        );
    }
    Ok(serde_json::Value::Object(serde_json::Map::from_iter(tables)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::NodeId;
    use indoc::indoc;

    #[test]
    fn test_read_edge_records_skips_header() {
        let data = indoc!("
            node_a,node_b,weight,timestep
            a, b, 0.5, 0
            b,c,1,3
        ");
        let records = read_edge_records(data.as_bytes(), "edges.csv").unwrap();
        assert_eq!(records, vec![
            EdgeRecord::new("a", "b", 0.5, 0),
            EdgeRecord::new("b", "c", 1.0, 3),
        ]);
    }

    #[test]
    fn test_malformed_rows_report_their_line() {
        let data = indoc!("
            node_a,node_b,weight,timestep
            a,b,0.5,0
            a,b,heavy,1
        ");
        match read_edge_records(data.as_bytes(), "edges.csv") {
            Err(Error::MalformedRecord { source_name, line, .. }) => {
                assert_eq!(source_name, "edges.csv");
                assert_eq!(line, 3);
            },
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn test_read_diagnosis_records() {
        let data = indoc!("
            node_id,timestep,state
            a,0,0
            a,4,1
        ");
        let records = read_diagnosis_records(data.as_bytes(), "health.csv").unwrap();
        assert_eq!(records, vec![
            DiagnosisRecord::new("a", 0, HealthState::Healthy),
            DiagnosisRecord::new("a", 4, HealthState::Sick),
        ]);

        let bad = "node_id,timestep,state\na,0,2\n";
        assert!(matches!(
            read_diagnosis_records(bad.as_bytes(), "health.csv"),
            Err(Error::MalformedRecord { line: 2, .. })
        ));
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            load_edge_records("/nonexistent/edges.csv"),
            Err(Error::InvalidInputPath(_))
        ));
    }

    #[test]
    fn test_tables_dump_to_json() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        create_tables(&conn).unwrap();
        write_meta(&conn, "seed_date", 3i64).unwrap();

        let nodes: Vec<NodeId> = vec!["a".into()];
        let timeline = HealthTimeline::extract(&[
            DiagnosisRecord::new("a", 0, HealthState::Healthy),
            DiagnosisRecord::new("a", 3, HealthState::Sick),
        ], &nodes, false).unwrap();
        write_intervals(&conn, &timeline).unwrap();

        let network = TemporalNetwork::build(&[EdgeRecord::new("a", "b", 1.0, 2)], false);
        write_network_edges(&conn, 0, &network).unwrap();
        write_null_network(&conn, 1, 0.25).unwrap();

        let json = db_to_json(&conn).unwrap();
        assert_eq!(json["Meta"]["key"], serde_json::json!(["seed_date"]));
        assert_eq!(json["Intervals"]["state"], serde_json::json!([0, 1]));
        assert_eq!(json["Intervals"]["start_day"], serde_json::json!([0, 3]));
        assert_eq!(json["NetworkEdges"]["weight"], serde_json::json!([1.0]));
        assert_eq!(json["NullNetworks"]["mean_jaccard"], serde_json::json!([0.25]));
        assert_eq!(json["ContactDays"]["day"], serde_json::json!([]));
    }
}
