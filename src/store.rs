//! Object store interface and a directory-backed implementation.
//!
//! The pipeline only talks to the store through [`ObjectStore`]. Objects are
//! addressed by `container/object[/version]` references, where `object` is a
//! numeric id or an object name and a missing version means "latest".

use crate::error::{Result, WgaError};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Descriptor of a stored object version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectInfo {
    pub object_id: u64,
    pub name: String,
    pub type_name: String,
    pub container_id: u64,
    pub version: u64,
    #[serde(default)]
    pub hidden: bool,
}

impl ObjectInfo {
    /// Fully qualified `container/object/version` reference.
    pub fn reference(&self) -> String {
        format!("{}/{}/{}", self.container_id, self.object_id, self.version)
    }
}

/// A fetched object: its payload plus its descriptor.
#[derive(Debug, Clone)]
pub struct ObjectData {
    pub data: Value,
    pub info: ObjectInfo,
}

/// One step of lineage attached to every saved object.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProvenanceAction {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default)]
    pub method_params: Vec<Value>,
    #[serde(default)]
    pub input_ws_objects: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Fields supplied by callers that this crate does not interpret
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// An object to be saved.
#[derive(Debug, Clone)]
pub struct ObjectSpec {
    pub type_name: String,
    pub name: String,
    pub data: Value,
    pub meta: Map<String, Value>,
    pub hidden: bool,
    pub provenance: Vec<ProvenanceAction>,
}

impl ObjectSpec {
    pub fn new(type_name: impl Into<String>, name: impl Into<String>, data: Value) -> Self {
        ObjectSpec {
            type_name: type_name.into(),
            name: name.into(),
            data,
            meta: Map::new(),
            hidden: false,
            provenance: Vec::new(),
        }
    }

    pub fn hidden(mut self, hidden: bool) -> Self {
        self.hidden = hidden;
        self
    }

    pub fn provenance(mut self, provenance: Vec<ProvenanceAction>) -> Self {
        self.provenance = provenance;
        self
    }
}

/// Read/write access to the object store.
pub trait ObjectStore {
    /// Fetches every reference, in order.
    fn get_objects(&self, references: &[String]) -> Result<Vec<ObjectData>>;

    /// Saves `objects` into `container_id`, returning one descriptor each.
    fn save_objects(&self, container_id: u64, objects: Vec<ObjectSpec>) -> Result<Vec<ObjectInfo>>;
}

impl<S: ObjectStore + ?Sized> ObjectStore for &S {
    fn get_objects(&self, references: &[String]) -> Result<Vec<ObjectData>> {
        (**self).get_objects(references)
    }

    fn save_objects(&self, container_id: u64, objects: Vec<ObjectSpec>) -> Result<Vec<ObjectInfo>> {
        (**self).save_objects(container_id, objects)
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredRecord {
    info: ObjectInfo,
    data: Value,
    #[serde(default)]
    meta: Map<String, Value>,
    #[serde(default)]
    provenance: Vec<ProvenanceAction>,
}

/// Object store kept as JSON files under a root directory.
///
/// Layout: `<root>/<container>/<object>/<version>.json`.
#[derive(Debug, Clone)]
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    /// Opens (creating if needed) a store rooted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(LocalStore { root })
    }

    /// Saves a single object, used to seed a store with inputs.
    pub fn put(
        &self,
        container_id: u64,
        type_name: &str,
        name: &str,
        data: Value,
    ) -> Result<ObjectInfo> {
        let mut infos =
            self.save_objects(container_id, vec![ObjectSpec::new(type_name, name, data)])?;
        infos
            .pop()
            .ok_or_else(|| WgaError::persist(name, "store returned no descriptor"))
    }

    /// Provenance recorded for the object at `reference`.
    pub fn provenance(&self, reference: &str) -> Result<Vec<ProvenanceAction>> {
        Ok(self.load(reference)?.provenance)
    }

    fn container_dir(&self, container_id: u64) -> PathBuf {
        self.root.join(container_id.to_string())
    }

    fn load(&self, reference: &str) -> Result<StoredRecord> {
        let parts: Vec<&str> = reference.split('/').collect();
        if parts.len() < 2 || parts.len() > 3 {
            return Err(WgaError::fetch(reference, "expected container/object[/version]"));
        }
        let container_id: u64 = parts[0]
            .parse()
            .map_err(|_| WgaError::fetch(reference, "container must be numeric"))?;
        let container = self.container_dir(container_id);

        let object_id = match parts[1].parse::<u64>() {
            Ok(id) => id,
            Err(_) => self
                .find_by_name(&container, parts[1])?
                .ok_or_else(|| WgaError::fetch(reference, "no object with that name"))?,
        };
        let object_dir = container.join(object_id.to_string());

        let version = match parts.get(2) {
            Some(v) => v
                .parse::<u64>()
                .map_err(|_| WgaError::fetch(reference, "version must be numeric"))?,
            None => latest_version(&object_dir)?
                .ok_or_else(|| WgaError::fetch(reference, "object does not exist"))?,
        };

        let path = object_dir.join(format!("{version}.json"));
        let text = fs::read_to_string(&path)
            .map_err(|e| WgaError::fetch(reference, format!("{}: {e}", path.display())))?;
        serde_json::from_str(&text).map_err(|e| WgaError::fetch(reference, e.to_string()))
    }

    fn find_by_name(&self, container: &Path, name: &str) -> Result<Option<u64>> {
        for object_id in numeric_entries(container)? {
            let object_dir = container.join(object_id.to_string());
            if let Some(version) = latest_version(&object_dir)? {
                let text = fs::read_to_string(object_dir.join(format!("{version}.json")))?;
                let record: StoredRecord = serde_json::from_str(&text)?;
                if record.info.name == name {
                    return Ok(Some(object_id));
                }
            }
        }
        Ok(None)
    }

    fn save_one(&self, container_id: u64, spec: ObjectSpec) -> Result<ObjectInfo> {
        let container = self.container_dir(container_id);
        fs::create_dir_all(&container)?;

        let (object_id, version) = match self.find_by_name(&container, &spec.name)? {
            Some(id) => {
                let latest = latest_version(&container.join(id.to_string()))?.unwrap_or(0);
                (id, latest + 1)
            }
            None => {
                let next = numeric_entries(&container)?.into_iter().max().unwrap_or(0) + 1;
                (next, 1)
            }
        };

        let info = ObjectInfo {
            object_id,
            name: spec.name,
            type_name: spec.type_name,
            container_id,
            version,
            hidden: spec.hidden,
        };
        let record = StoredRecord {
            info: info.clone(),
            data: spec.data,
            meta: spec.meta,
            provenance: spec.provenance,
        };

        let object_dir = container.join(object_id.to_string());
        fs::create_dir_all(&object_dir)?;
        let mut tmp = NamedTempFile::new_in(&object_dir)?;
        serde_json::to_writer_pretty(&mut tmp, &record)?;
        tmp.flush()?;
        tmp.persist(object_dir.join(format!("{version}.json")))?;

        log::debug!("Saved {} as {}", info.name, info.reference());
        Ok(info)
    }
}

impl ObjectStore for LocalStore {
    fn get_objects(&self, references: &[String]) -> Result<Vec<ObjectData>> {
        references
            .iter()
            .map(|reference| {
                let record = self.load(reference)?;
                Ok(ObjectData {
                    data: record.data,
                    info: record.info,
                })
            })
            .collect()
    }

    fn save_objects(&self, container_id: u64, objects: Vec<ObjectSpec>) -> Result<Vec<ObjectInfo>> {
        objects
            .into_iter()
            .map(|spec| {
                let name = spec.name.clone();
                self.save_one(container_id, spec)
                    .map_err(|e| WgaError::persist(name, e.to_string()))
            })
            .collect()
    }
}

/// Numeric directory names directly below `dir`.
fn numeric_entries(dir: &Path) -> Result<Vec<u64>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut ids = Vec::new();
    for entry in fs::read_dir(dir)?.flatten() {
        if let Some(id) = entry.file_name().to_str().and_then(|s| s.parse().ok()) {
            ids.push(id);
        }
    }
    ids.sort_unstable();
    Ok(ids)
}

fn latest_version(object_dir: &Path) -> Result<Option<u64>> {
    if !object_dir.exists() {
        return Ok(None);
    }
    let mut latest = None;
    for entry in fs::read_dir(object_dir)?.flatten() {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        if let Some(v) = path
            .file_stem()
            .and_then(|s| s.to_str())
            .and_then(|s| s.parse::<u64>().ok())
        {
            latest = latest.max(Some(v));
        }
    }
    Ok(latest)
}
