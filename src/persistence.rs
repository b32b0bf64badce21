use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::organism::{Command, Genome};
use crate::physics::{GeometryDescriptor, GeometryKind};

// Columns per command in a generation row: jump, left, right, threshold
const COMMAND_COLUMNS: usize = 4;
// Columns per map row: x, y, width, height, kind
const GEOMETRY_COLUMNS: usize = 5;

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("{} does not exist", .0.display())]
    NotFound(PathBuf),
    #[error("malformed data in {}: {reason}", .path.display())]
    Malformed { path: PathBuf, reason: String },
    #[error("generation {generation} of map {map_id} does not fit this run: {reason}")]
    ShapeMismatch { map_id: u32, generation: u32, reason: String },
    #[error("i/o failure on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Persisted progress of one map. A champion is present exactly when the map
/// has been completed.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MapStatus {
    pub generation: u32,
    pub champion: Option<Genome>,
}

impl MapStatus {
    pub fn new(generation: u32, champion: Option<Genome>) -> Self {
        Self { generation, champion }
    }

    pub fn is_complete(&self) -> bool {
        self.champion.is_some()
    }
}

/// Storage consumed by the evolution engine. Every call is synchronous.
pub trait PersistenceGateway: Send + Sync {
    fn load_generation(&self, map_id: u32, generation: u32) -> Result<Vec<Genome>, PersistenceError>;
    fn save_generation(&mut self, map_id: u32, generation: u32, genomes: &[Genome]) -> Result<(), PersistenceError>;
    fn load_map_status(&self, map_id: u32) -> Result<MapStatus, PersistenceError>;
    fn save_map_status(&mut self, map_id: u32, status: &MapStatus) -> Result<(), PersistenceError>;
    fn load_map_geometry(&self, map_id: u32) -> Result<Vec<GeometryDescriptor>, PersistenceError>;
    fn save_map_geometry(&mut self, map_id: u32, geometry: &[GeometryDescriptor]) -> Result<(), PersistenceError>;
}

// === File Store ===

/// Plain-text store laid out as `<root>/maps/map<id>/...`.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn map_dir(&self, map_id: u32) -> PathBuf {
        self.root.join("maps").join(format!("map{map_id}"))
    }

    fn geometry_path(&self, map_id: u32) -> PathBuf {
        self.map_dir(map_id).join("map.txt")
    }

    fn status_path(&self, map_id: u32) -> PathBuf {
        self.map_dir(map_id).join("general_information.txt")
    }

    fn generation_path(&self, map_id: u32, generation: u32) -> PathBuf {
        self.map_dir(map_id)
            .join("character_data")
            .join(format!("generation{generation}.txt"))
    }
}

fn read_text(path: &Path) -> Result<String, PersistenceError> {
    fs::read_to_string(path).map_err(|source| match source.kind() {
        io::ErrorKind::NotFound => PersistenceError::NotFound(path.to_path_buf()),
        _ => PersistenceError::Io { path: path.to_path_buf(), source },
    })
}

fn write_text(path: &Path, contents: &str) -> Result<(), PersistenceError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|source| PersistenceError::Io { path: parent.to_path_buf(), source })?;
    }
    fs::write(path, contents).map_err(|source| PersistenceError::Io { path: path.to_path_buf(), source })
}

fn malformed(path: &Path, reason: String) -> PersistenceError {
    PersistenceError::Malformed { path: path.to_path_buf(), reason }
}

impl PersistenceGateway for FileStore {
    fn load_generation(&self, map_id: u32, generation: u32) -> Result<Vec<Genome>, PersistenceError> {
        let path = self.generation_path(map_id, generation);
        let text = read_text(&path)?;
        decode_generation(&text).map_err(|reason| malformed(&path, reason))
    }

    fn save_generation(&mut self, map_id: u32, generation: u32, genomes: &[Genome]) -> Result<(), PersistenceError> {
        write_text(&self.generation_path(map_id, generation), &encode_generation(genomes))
    }

    fn load_map_status(&self, map_id: u32) -> Result<MapStatus, PersistenceError> {
        let path = self.status_path(map_id);
        let text = read_text(&path)?;
        decode_status(&text).map_err(|reason| malformed(&path, reason))
    }

    fn save_map_status(&mut self, map_id: u32, status: &MapStatus) -> Result<(), PersistenceError> {
        write_text(&self.status_path(map_id), &encode_status(status))
    }

    fn load_map_geometry(&self, map_id: u32) -> Result<Vec<GeometryDescriptor>, PersistenceError> {
        let path = self.geometry_path(map_id);
        let text = read_text(&path)?;
        decode_geometry(&text).map_err(|reason| malformed(&path, reason))
    }

    fn save_map_geometry(&mut self, map_id: u32, geometry: &[GeometryDescriptor]) -> Result<(), PersistenceError> {
        write_text(&self.geometry_path(map_id), &encode_geometry(geometry))
    }
}

// --- Text Codecs ---
//
// Grid files start with the row count and the column count on their own
// lines, followed by one whitespace-separated row per line.

fn encode_grid(columns: usize, rows: &[Vec<String>]) -> String {
    let mut out = format!("{}\n{}\n", rows.len(), columns);
    for row in rows {
        out.push_str(&row.join(" "));
        out.push('\n');
    }
    out
}

fn decode_grid(text: &str) -> Result<(usize, Vec<Vec<&str>>), String> {
    let mut lines = text.lines();
    let row_count: usize = parse_header(lines.next(), "row count")?;
    let columns: usize = parse_header(lines.next(), "column count")?;

    // The header is untrusted, so rows grow as they are read
    let mut rows = Vec::new();
    for index in 0..row_count {
        let line = lines.next().ok_or_else(|| format!("expected {row_count} rows, found {index}"))?;
        let row: Vec<&str> = line.split_whitespace().collect();
        if row.len() != columns {
            return Err(format!("row {index} has {} columns, expected {columns}", row.len()));
        }
        rows.push(row);
    }
    Ok((columns, rows))
}

fn parse_header(line: Option<&str>, what: &str) -> Result<usize, String> {
    let line = line.ok_or_else(|| format!("missing {what}"))?;
    line.trim().parse().map_err(|_| format!("invalid {what} {line:?}"))
}

fn parse_bool(token: &str) -> Result<bool, String> {
    match token {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => Err(format!("expected true or false, found {token:?}")),
    }
}

fn parse_number<T: std::str::FromStr>(token: &str) -> Result<T, String> {
    token.parse().map_err(|_| format!("invalid number {token:?}"))
}

fn genome_tokens(genome: &Genome) -> Vec<String> {
    genome
        .commands()
        .iter()
        .flat_map(|c| [c.jump.to_string(), c.left.to_string(), c.right.to_string(), c.threshold_ms.to_string()])
        .collect()
}

fn decode_genome(tokens: &[&str]) -> Result<Genome, String> {
    if tokens.is_empty() || tokens.len() % COMMAND_COLUMNS != 0 {
        return Err(format!("{} genome tokens is not a whole number of commands", tokens.len()));
    }
    let commands = tokens
        .chunks(COMMAND_COLUMNS)
        .map(|chunk| -> Result<Command, String> {
            Ok(Command::new(
                parse_bool(chunk[0])?,
                parse_bool(chunk[1])?,
                parse_bool(chunk[2])?,
                parse_number(chunk[3])?,
            ))
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Genome::from_commands(commands))
}

pub fn encode_generation(genomes: &[Genome]) -> String {
    let columns = genomes.first().map_or(0, |g| g.len() * COMMAND_COLUMNS);
    let rows: Vec<Vec<String>> = genomes.iter().map(genome_tokens).collect();
    encode_grid(columns, &rows)
}

pub fn decode_generation(text: &str) -> Result<Vec<Genome>, String> {
    // Population size and genome length are checked against the run by the engine
    let (columns, rows) = decode_grid(text)?;
    if columns == 0 || columns % COMMAND_COLUMNS != 0 {
        return Err(format!("column count {columns} is not a whole number of commands"));
    }
    if rows.is_empty() {
        return Err("generation has no genomes".to_string());
    }
    rows.iter().map(|row| decode_genome(row)).collect()
}

pub fn encode_status(status: &MapStatus) -> String {
    let mut out = format!("{}\n{}\n", status.generation, status.is_complete());
    if let Some(champion) = &status.champion {
        out.push_str(&genome_tokens(champion).join(" "));
        out.push('\n');
    }
    out
}

pub fn decode_status(text: &str) -> Result<MapStatus, String> {
    let mut lines = text.lines();
    let generation: u32 = parse_number(lines.next().ok_or("missing generation index")?.trim())?;
    let complete = parse_bool(lines.next().ok_or("missing completion flag")?.trim())?;
    let champion = if complete {
        let line = lines.next().ok_or("completed map has no champion")?;
        let tokens: Vec<&str> = line.split_whitespace().collect();
        Some(decode_genome(&tokens)?)
    } else {
        None
    };
    Ok(MapStatus { generation, champion })
}

pub fn encode_geometry(geometry: &[GeometryDescriptor]) -> String {
    let rows: Vec<Vec<String>> = geometry
        .iter()
        .map(|d| {
            vec![
                d.x.to_string(),
                d.y.to_string(),
                d.width.to_string(),
                d.height.to_string(),
                d.kind.tag().to_string(),
            ]
        })
        .collect();
    encode_grid(GEOMETRY_COLUMNS, &rows)
}

// Rows with an unknown kind tag are skipped
pub fn decode_geometry(text: &str) -> Result<Vec<GeometryDescriptor>, String> {
    let (columns, rows) = decode_grid(text)?;
    if !rows.is_empty() && columns != GEOMETRY_COLUMNS {
        return Err(format!("map rows need {GEOMETRY_COLUMNS} columns, found {columns}"));
    }
    let mut geometry = Vec::with_capacity(rows.len());
    for row in rows {
        let Some(kind) = GeometryKind::from_tag(row[4]) else {
            continue;
        };
        geometry.push(GeometryDescriptor {
            x: parse_number(row[0])?,
            y: parse_number(row[1])?,
            width: parse_number(row[2])?,
            height: parse_number(row[3])?,
            kind,
        });
    }
    Ok(geometry)
}

// === In-Memory Store ===

#[cfg(test)]
pub(crate) mod memory {
    use std::collections::HashMap;

    use super::*;

    /// Gateway double that keeps everything in maps and can be told to fail writes.
    #[derive(Debug, Default, Clone)]
    pub struct MemoryStore {
        pub generations: HashMap<(u32, u32), Vec<Genome>>,
        pub statuses: HashMap<u32, MapStatus>,
        pub geometry: HashMap<u32, Vec<GeometryDescriptor>>,
        pub malformed_generations: Vec<(u32, u32)>,
        pub malformed_status: bool,
        pub fail_writes: bool,
    }

    impl MemoryStore {
        fn path(what: &str) -> PathBuf {
            PathBuf::from(format!("memory/{what}"))
        }

        fn check_write(&self, what: &str) -> Result<(), PersistenceError> {
            if self.fail_writes {
                return Err(PersistenceError::Io {
                    path: Self::path(what),
                    source: io::Error::new(io::ErrorKind::PermissionDenied, "writes disabled"),
                });
            }
            Ok(())
        }
    }

    impl PersistenceGateway for MemoryStore {
        fn load_generation(&self, map_id: u32, generation: u32) -> Result<Vec<Genome>, PersistenceError> {
            if self.malformed_generations.contains(&(map_id, generation)) {
                return Err(PersistenceError::Malformed {
                    path: Self::path("generation"),
                    reason: "corrupt".to_string(),
                });
            }
            self.generations
                .get(&(map_id, generation))
                .cloned()
                .ok_or_else(|| PersistenceError::NotFound(Self::path("generation")))
        }

        fn save_generation(&mut self, map_id: u32, generation: u32, genomes: &[Genome]) -> Result<(), PersistenceError> {
            self.check_write("generation")?;
            self.generations.insert((map_id, generation), genomes.to_vec());
            Ok(())
        }

        fn load_map_status(&self, map_id: u32) -> Result<MapStatus, PersistenceError> {
            if self.malformed_status {
                return Err(PersistenceError::Malformed { path: Self::path("status"), reason: "corrupt".to_string() });
            }
            self.statuses
                .get(&map_id)
                .cloned()
                .ok_or_else(|| PersistenceError::NotFound(Self::path("status")))
        }

        fn save_map_status(&mut self, map_id: u32, status: &MapStatus) -> Result<(), PersistenceError> {
            self.check_write("status")?;
            self.statuses.insert(map_id, status.clone());
            Ok(())
        }

        fn load_map_geometry(&self, map_id: u32) -> Result<Vec<GeometryDescriptor>, PersistenceError> {
            self.geometry
                .get(&map_id)
                .cloned()
                .ok_or_else(|| PersistenceError::NotFound(Self::path("geometry")))
        }

        fn save_map_geometry(&mut self, map_id: u32, geometry: &[GeometryDescriptor]) -> Result<(), PersistenceError> {
            self.check_write("geometry")?;
            self.geometry.insert(map_id, geometry.to_vec());
            Ok(())
        }
    }
}
