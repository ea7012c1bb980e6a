//! Static type catalogs for the sparse layers.
//!
//! Catalogs are read once at startup from `objects.json`,
//! `resources.json`, `blocking.json` and `surfaces.json`, each a JSON
//! array of definitions. A missing or malformed file falls back to the
//! built-in starter set for that catalog. Lookups by type id ignore case
//! and surrounding whitespace.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;
use serde::de::DeserializeOwned;
use tileforge_protocol::{Codec, JsonCodec};

use crate::WorldError;

/// A placeable object type.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectDef {
    pub id: String,
    /// Whether placed objects block movement unless the edit says otherwise.
    #[serde(default)]
    pub blocking: bool,
}

/// A harvestable resource type.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceDef {
    pub id: String,
    #[serde(default)]
    pub default_amount: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockingDef {
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SurfaceDef {
    pub id: i32,
    #[serde(default)]
    pub name: String,
}

trait Keyed {
    fn id_mut(&mut self) -> &mut String;
}

impl Keyed for ObjectDef {
    fn id_mut(&mut self) -> &mut String {
        &mut self.id
    }
}

impl Keyed for ResourceDef {
    fn id_mut(&mut self) -> &mut String {
        &mut self.id
    }
}

impl Keyed for BlockingDef {
    fn id_mut(&mut self) -> &mut String {
        &mut self.id
    }
}

/// Normalized lookup key for a type id.
pub fn type_key(id: &str) -> String {
    id.trim().to_ascii_lowercase()
}

/// The four read-only lookup tables.
///
/// Ids are stored in canonical (trimmed, lower-case) form.
#[derive(Debug, Clone, Default)]
pub struct Catalogs {
    objects: HashMap<String, ObjectDef>,
    resources: HashMap<String, ResourceDef>,
    blocking: HashMap<String, BlockingDef>,
    surfaces: HashMap<i32, SurfaceDef>,
}

impl Catalogs {
    /// Builds catalogs from definition lists. Blank ids are dropped.
    pub fn from_defs(
        objects: Vec<ObjectDef>,
        resources: Vec<ResourceDef>,
        blocking: Vec<BlockingDef>,
        surfaces: Vec<SurfaceDef>,
    ) -> Self {
        fn keyed<D: Keyed>(defs: Vec<D>) -> HashMap<String, D> {
            let mut map = HashMap::new();
            for mut def in defs {
                let key = type_key(def.id_mut());
                if key.is_empty() {
                    continue;
                }
                *def.id_mut() = key.clone();
                map.insert(key, def);
            }
            map
        }

        Self {
            objects: keyed(objects),
            resources: keyed(resources),
            blocking: keyed(blocking),
            surfaces: surfaces.into_iter().map(|d| (d.id, d)).collect(),
        }
    }

    /// The built-in starter set.
    pub fn builtin() -> Self {
        Self::from_defs(
            builtin_objects(),
            builtin_resources(),
            builtin_blocking(),
            builtin_surfaces(),
        )
    }

    /// Loads each catalog file from `dir`, falling back per file to the
    /// built-in set.
    pub fn load(dir: &Path) -> Self {
        let catalogs = Self::from_defs(
            load_or(dir, "objects.json", builtin_objects),
            load_or(dir, "resources.json", builtin_resources),
            load_or(dir, "blocking.json", builtin_blocking),
            load_or(dir, "surfaces.json", builtin_surfaces),
        );
        tracing::info!(
            objects = catalogs.objects.len(),
            resources = catalogs.resources.len(),
            blocking = catalogs.blocking.len(),
            surfaces = catalogs.surfaces.len(),
            "catalogs loaded"
        );
        catalogs
    }

    pub fn object(&self, id: &str) -> Option<&ObjectDef> {
        self.objects.get(&type_key(id))
    }

    pub fn resource(&self, id: &str) -> Option<&ResourceDef> {
        self.resources.get(&type_key(id))
    }

    pub fn blocking(&self, id: &str) -> Option<&BlockingDef> {
        self.blocking.get(&type_key(id))
    }

    pub fn surface(&self, id: i32) -> Option<&SurfaceDef> {
        self.surfaces.get(&id)
    }
}

fn load_or<D: DeserializeOwned>(dir: &Path, file: &str, fallback: fn() -> Vec<D>) -> Vec<D> {
    let path = dir.join(file);
    if !path.exists() {
        tracing::info!(file, "catalog file missing, using built-in defaults");
        return fallback();
    }
    match read_defs(&path) {
        Ok(defs) => defs,
        Err(e) => {
            tracing::warn!(error = %e, "catalog unreadable, using built-in defaults");
            fallback()
        }
    }
}

fn read_defs<D: DeserializeOwned>(path: &Path) -> Result<Vec<D>, WorldError> {
    let text = std::fs::read_to_string(path).map_err(|source| WorldError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    JsonCodec
        .decode(&text)
        .map_err(|source| WorldError::Malformed {
            path: path.to_path_buf(),
            source,
        })
}

fn builtin_objects() -> Vec<ObjectDef> {
    vec![
        ObjectDef {
            id: "wall_wood".into(),
            blocking: true,
        },
        ObjectDef {
            id: "fence".into(),
            blocking: true,
        },
        ObjectDef {
            id: "torch".into(),
            blocking: false,
        },
    ]
}

fn builtin_resources() -> Vec<ResourceDef> {
    vec![
        ResourceDef {
            id: "tree_oak".into(),
            default_amount: 5,
        },
        ResourceDef {
            id: "rock".into(),
            default_amount: 3,
        },
    ]
}

fn builtin_blocking() -> Vec<BlockingDef> {
    ["wall_wood", "fence", "tree_oak", "rock"]
        .into_iter()
        .map(|id| BlockingDef { id: id.into() })
        .collect()
}

fn builtin_surfaces() -> Vec<SurfaceDef> {
    vec![
        SurfaceDef {
            id: 1,
            name: "grass".into(),
        },
        SurfaceDef {
            id: 2,
            name: "road".into(),
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_contains_starter_types() {
        let c = Catalogs::builtin();
        assert!(c.object("wall_wood").unwrap().blocking);
        assert_eq!(c.resource("tree_oak").unwrap().default_amount, 5);
        assert!(c.blocking("rock").is_some());
        assert_eq!(c.surface(2).unwrap().name, "road");
        assert!(c.surface(0).is_none());
    }

    #[test]
    fn test_lookup_ignores_case_and_whitespace() {
        let c = Catalogs::builtin();
        let def = c.object("  Wall_WOOD ").unwrap();
        assert_eq!(def.id, "wall_wood");
        assert!(c.object("").is_none());
        assert!(c.object("castle").is_none());
    }

    #[test]
    fn test_from_defs_canonicalizes_ids_and_drops_blank() {
        let c = Catalogs::from_defs(
            vec![
                ObjectDef {
                    id: " Statue ".into(),
                    blocking: false,
                },
                ObjectDef {
                    id: "   ".into(),
                    blocking: true,
                },
            ],
            vec![],
            vec![],
            vec![],
        );
        assert_eq!(c.object("statue").unwrap().id, "statue");
        assert_eq!(c.objects.len(), 1);
    }

    #[test]
    fn test_load_reads_files_and_falls_back_per_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("objects.json"),
            r#"[{"id":"Bench","blocking":false}]"#,
        )
        .unwrap();
        std::fs::write(dir.path().join("resources.json"), "not json").unwrap();

        let c = Catalogs::load(dir.path());
        assert!(c.object("bench").is_some());
        assert!(c.object("wall_wood").is_none());
        // Malformed and missing files both use the built-ins.
        assert!(c.resource("tree_oak").is_some());
        assert!(c.surface(1).is_some());
    }
}
