//! Brand and project context discovery.
//!
//! Resolution walks a fixed precedence ladder, first non-empty wins:
//!
//! 1. `AGENTIC_*` environment flags
//! 2. `.agentic/config.json` under the project root
//! 3. `package.json` manifest key `"agentic"`
//! 4. Repo marker: `brand-pack.ref.json` or inline `brand-pack.json`
//! 5. Persistent mapping from project root hash → brand pack
//! 6. Auto-bind when the store holds exactly one pack
//! 7. Degraded: no token substitution, structural rules only
//!
//! Strict mode turns rungs 6–7 into hard errors. Every successful
//! resolution writes `.agentic/brand-pack.lock.json`; when the pack store
//! is offline, the lock snapshot is the authoritative fallback.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::config::{Config, env_value};
use crate::diagnostics::{Diagnostic, DiagnosticKind};
use crate::error::{Error, Result};
use crate::models::{BrandPackRef, DiscoverySource, ProjectContext};
use crate::tokens::BrandPack;

// ---------------------------------------------------------------------------
// Brand-pack store collaborator
// ---------------------------------------------------------------------------

/// Read-only view of the brand-pack store. Writes happen outside the core.
pub trait BrandPackStore: Send + Sync {
    /// Fetch a pack at a concrete version, or the latest when `version` is
    /// `None`.
    fn get_brand_pack(&self, id: &str, version: Option<&str>) -> Result<BrandPack>;

    /// List `(id, latest_version)` for every pack the store holds.
    fn list_brand_packs(&self) -> Result<Vec<BrandPackRef>>;
}

/// In-memory store used by the CLI driver and tests.
#[derive(Debug, Default)]
pub struct StaticBrandPackStore {
    packs: Vec<BrandPack>,
}

impl StaticBrandPackStore {
    #[must_use]
    pub fn new(packs: Vec<BrandPack>) -> Self {
        Self { packs }
    }
}

impl BrandPackStore for StaticBrandPackStore {
    fn get_brand_pack(&self, id: &str, version: Option<&str>) -> Result<BrandPack> {
        self.packs
            .iter()
            .filter(|p| p.id == id)
            .filter(|p| version.is_none_or(|v| p.version == v))
            .next_back()
            .cloned()
            .ok_or_else(|| Error::UnresolvedBrand(format!("{id}@{}", version.unwrap_or("latest"))))
    }

    fn list_brand_packs(&self) -> Result<Vec<BrandPackRef>> {
        Ok(self
            .packs
            .iter()
            .map(|p| BrandPackRef {
                id: p.id.clone(),
                version: p.version.clone(),
            })
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Lock snapshot
// ---------------------------------------------------------------------------

/// On-disk fallback snapshot of the resolved brand reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockSnapshot {
    pub id: String,
    pub version: String,
    pub source: DiscoverySource,
    pub resolved_at: chrono::DateTime<chrono::Utc>,
}

fn lock_path(project_root: &Path) -> PathBuf {
    project_root.join(".agentic").join("brand-pack.lock.json")
}

fn write_lock(project_root: &Path, reference: &BrandPackRef, source: DiscoverySource) {
    let snapshot = LockSnapshot {
        id: reference.id.clone(),
        version: reference.version.clone(),
        source,
        resolved_at: crate::models::now_utc(),
    };
    let path = lock_path(project_root);
    let result = fs::create_dir_all(path.parent().unwrap_or(project_root))
        .and_then(|()| {
            let json = serde_json::to_string_pretty(&snapshot)?;
            fs::write(&path, json)
        });
    if let Err(e) = result {
        // Lock snapshots are best-effort; resolution already succeeded.
        debug!(error = %e, path = %path.display(), "failed to write brand-pack lock snapshot");
    }
}

fn read_lock(project_root: &Path) -> Option<LockSnapshot> {
    let text = fs::read_to_string(lock_path(project_root)).ok()?;
    serde_json::from_str(&text).ok()
}

// ---------------------------------------------------------------------------
// Config / manifest / marker file shapes
// ---------------------------------------------------------------------------

/// `.agentic/config.json` and the `package.json` `"agentic"` key share
/// this shape.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AgenticConfigFile {
    brand_pack_id: Option<String>,
    brand_version: Option<String>,
    project_id: Option<String>,
    #[serde(default)]
    overrides: serde_json::Map<String, serde_json::Value>,
}

/// `brand-pack.ref.json` marker.
#[derive(Debug, Clone, Deserialize)]
struct BrandPackRefFile {
    id: String,
    version: Option<String>,
}

/// Lenient JSON read: strict `serde_json` first, `json5` fallback for
/// hand-edited files with comments or trailing commas.
fn read_lenient_json(path: &Path) -> Option<serde_json::Value> {
    let text = fs::read_to_string(path).ok()?;
    match serde_json::from_str(&text) {
        Ok(v) => Some(v),
        Err(json_error) => match json5::from_str::<serde_json::Value>(&text) {
            Ok(v) => Some(v),
            Err(_) => {
                warn!(path = %path.display(), error = %json_error, "unreadable config file");
                None
            }
        },
    }
}

// ---------------------------------------------------------------------------
// Hashing
// ---------------------------------------------------------------------------

/// Stable hash of the project root path; key for the mapping table.
#[must_use]
pub fn root_hash(project_root: &Path) -> String {
    let canonical = project_root
        .canonicalize()
        .unwrap_or_else(|_| project_root.to_path_buf());
    let digest = Sha256::digest(canonical.to_string_lossy().as_bytes());
    hex::encode(&digest[..8])
}

/// Stable hash of the project override map; participates in the cache
/// signature.
#[must_use]
pub fn overrides_hash(overrides: &serde_json::Map<String, serde_json::Value>) -> String {
    if overrides.is_empty() {
        return "none".to_string();
    }
    // serde_json with preserve_order keeps insertion order; sort keys for
    // a stable digest regardless of file layout.
    let mut keys: Vec<&String> = overrides.keys().collect();
    keys.sort();
    let mut hasher = Sha256::new();
    for key in keys {
        hasher.update(key.as_bytes());
        hasher.update([0x1f]);
        hasher.update(overrides[key].to_string().as_bytes());
        hasher.update([0x1e]);
    }
    hex::encode(&hasher.finalize()[..8])
}

// ---------------------------------------------------------------------------
// Discovery
// ---------------------------------------------------------------------------

/// Result of a discovery run: the resolved context, the fetched pack when
/// the store had it, and any degraded-path diagnostics.
#[derive(Debug, Clone)]
pub struct Discovery {
    pub context: ProjectContext,
    pub pack: Option<Arc<BrandPack>>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Candidate reference produced by one rung of the ladder.
#[derive(Debug, Clone)]
struct Candidate {
    id: String,
    version: Option<String>,
    source: DiscoverySource,
    project_id: Option<String>,
    overrides: serde_json::Map<String, serde_json::Value>,
    /// Inline pack parsed straight from a `brand-pack.json` marker.
    inline_pack: Option<BrandPack>,
}

/// Path of the persistent root-hash → pack mapping table.
#[must_use]
pub fn mappings_path() -> PathBuf {
    if let Some(p) = env_value("AGENTIC_MAPPINGS_PATH") {
        return PathBuf::from(p);
    }
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("agentic-design")
        .join("project-mappings.json")
}

/// Resolve `{brand pack, version, project id, overrides}` for a project
/// root, walking the precedence ladder.
pub fn resolve(
    config: &Config,
    project_root: &Path,
    store: &dyn BrandPackStore,
) -> Result<Discovery> {
    let rhash = root_hash(project_root);
    let fallback_project_id = project_root
        .file_name()
        .map_or_else(|| "project".to_string(), |n| n.to_string_lossy().to_string());

    let candidate = env_candidate(config)
        .or_else(|| agentic_config_candidate(project_root))
        .or_else(|| manifest_candidate(project_root))
        .or_else(|| marker_candidate(project_root))
        .or_else(|| mapping_candidate(&rhash));

    let mut diagnostics = Vec::new();

    let candidate = match candidate {
        Some(c) => Some(c),
        None => auto_bind_candidate(config, store, &mut diagnostics)?,
    };

    let Some(candidate) = candidate else {
        if config.strict {
            return Err(Error::UnresolvedBrand(fallback_project_id));
        }
        diagnostics.push(
            Diagnostic::new(
                DiagnosticKind::UnresolvedBrand,
                "no brand pack resolved; structural rules only",
            )
            .with_stage("discovery"),
        );
        let mut context = ProjectContext::degraded(fallback_project_id);
        context.root_hash = rhash;
        return Ok(Discovery {
            context,
            pack: None,
            diagnostics,
        });
    };

    let project_id = candidate
        .project_id
        .clone()
        .or_else(|| config.project_id.clone())
        .unwrap_or(fallback_project_id);

    // Fetch tokens. Inline markers carry their own; everything else goes
    // through the store, falling back to the lock snapshot when offline.
    let (pack, resolved_version, source) = match candidate.inline_pack {
        Some(pack) => {
            let version = pack.version.clone();
            (Some(Arc::new(pack)), Some(version), candidate.source)
        }
        None => match store.get_brand_pack(&candidate.id, candidate.version.as_deref()) {
            Ok(pack) => {
                let version = pack.version.clone();
                (Some(Arc::new(pack)), Some(version), candidate.source)
            }
            Err(store_err) => {
                if let Some(lock) = read_lock(project_root).filter(|l| l.id == candidate.id) {
                    diagnostics.push(
                        Diagnostic::new(
                            DiagnosticKind::DependencyUnavailable,
                            format!("brand-pack store unavailable, using lock snapshot: {store_err}"),
                        )
                        .with_stage("discovery"),
                    );
                    (None, Some(lock.version), DiscoverySource::Lock)
                } else {
                    if config.strict {
                        return Err(store_err);
                    }
                    diagnostics.push(
                        Diagnostic::new(
                            DiagnosticKind::UnresolvedBrand,
                            format!("brand pack {} could not be fetched: {store_err}", candidate.id),
                        )
                        .with_stage("discovery"),
                    );
                    (None, candidate.version.clone(), candidate.source)
                }
            }
        },
    };

    let mut overrides = candidate.overrides;
    let ohash = overrides_hash(&overrides);
    if let Some(pack) = &pack {
        // The snapshot compiler reads the hash off the pack.
        let mut pack = (**pack).clone();
        pack.overrides_hash.clone_from(&ohash);
        let reference = BrandPackRef {
            id: pack.id.clone(),
            version: pack.version.clone(),
        };
        write_lock(project_root, &reference, source);
        let context = ProjectContext {
            project_id,
            root_hash: rhash,
            brand_pack: Some(reference),
            overrides: std::mem::take(&mut overrides),
            source,
        };
        return Ok(Discovery {
            context,
            pack: Some(Arc::new(pack)),
            diagnostics,
        });
    }

    let brand_pack = resolved_version.map(|version| BrandPackRef {
        id: candidate.id.clone(),
        version,
    });
    let context = ProjectContext {
        project_id,
        root_hash: rhash,
        brand_pack,
        overrides,
        source,
    };
    Ok(Discovery {
        context,
        pack: None,
        diagnostics,
    })
}

fn env_candidate(config: &Config) -> Option<Candidate> {
    config.brand_pack_id.as_ref().map(|id| Candidate {
        id: id.clone(),
        version: config.brand_version.clone(),
        source: DiscoverySource::Env,
        project_id: config.project_id.clone(),
        overrides: serde_json::Map::new(),
        inline_pack: None,
    })
}

fn agentic_config_candidate(project_root: &Path) -> Option<Candidate> {
    let path = project_root.join(".agentic").join("config.json");
    let value = read_lenient_json(&path)?;
    let parsed: AgenticConfigFile = serde_json::from_value(value).ok()?;
    let id = parsed.brand_pack_id?;
    Some(Candidate {
        id,
        version: parsed.brand_version,
        source: DiscoverySource::Config,
        project_id: parsed.project_id,
        overrides: parsed.overrides,
        inline_pack: None,
    })
}

fn manifest_candidate(project_root: &Path) -> Option<Candidate> {
    let value = read_lenient_json(&project_root.join("package.json"))?;
    let agentic = value.get("agentic")?.clone();
    let parsed: AgenticConfigFile = serde_json::from_value(agentic).ok()?;
    let id = parsed.brand_pack_id?;
    Some(Candidate {
        id,
        version: parsed.brand_version,
        source: DiscoverySource::Manifest,
        project_id: parsed.project_id,
        overrides: parsed.overrides,
        inline_pack: None,
    })
}

fn marker_candidate(project_root: &Path) -> Option<Candidate> {
    let ref_path = project_root.join("brand-pack.ref.json");
    if let Some(value) = read_lenient_json(&ref_path) {
        if let Ok(parsed) = serde_json::from_value::<BrandPackRefFile>(value) {
            return Some(Candidate {
                id: parsed.id,
                version: parsed.version,
                source: DiscoverySource::Marker,
                project_id: None,
                overrides: serde_json::Map::new(),
                inline_pack: None,
            });
        }
    }
    // Inline pack: the marker document carries the tokens themselves.
    let inline_path = project_root.join("brand-pack.json");
    let value = read_lenient_json(&inline_path)?;
    let id = value.get("id")?.as_str()?.to_string();
    let version = value.get("version")?.as_str()?.to_string();
    let tokens = value.get("tokens")?;
    let pack = BrandPack::from_json(&id, &version, tokens).ok()?;
    Some(Candidate {
        id,
        version: Some(version),
        source: DiscoverySource::Marker,
        project_id: None,
        overrides: serde_json::Map::new(),
        inline_pack: Some(pack),
    })
}

fn mapping_candidate(rhash: &str) -> Option<Candidate> {
    let value = read_lenient_json(&mappings_path())?;
    let entry = value.get(rhash)?;
    let id = entry.get("id")?.as_str()?.to_string();
    let version = entry
        .get("version")
        .and_then(|v| v.as_str())
        .map(str::to_string);
    Some(Candidate {
        id,
        version,
        source: DiscoverySource::Mapping,
        project_id: None,
        overrides: serde_json::Map::new(),
        inline_pack: None,
    })
}

/// Rung 6: bind to the only pack in the store. Strict mode refuses.
fn auto_bind_candidate(
    config: &Config,
    store: &dyn BrandPackStore,
    diagnostics: &mut Vec<Diagnostic>,
) -> Result<Option<Candidate>> {
    if config.strict {
        return Err(Error::UnresolvedBrand(
            "strict mode forbids auto-bind".to_string(),
        ));
    }
    match store.list_brand_packs() {
        Ok(packs) if packs.len() == 1 => {
            let only = &packs[0];
            debug!(pack = %only.id, "auto-bound to the only brand pack in the store");
            Ok(Some(Candidate {
                id: only.id.clone(),
                version: Some(only.version.clone()),
                source: DiscoverySource::AutoBind,
                project_id: None,
                overrides: serde_json::Map::new(),
                inline_pack: None,
            }))
        }
        Ok(_) => Ok(None),
        Err(e) => {
            diagnostics.push(
                Diagnostic::new(
                    DiagnosticKind::DependencyUnavailable,
                    format!("brand-pack store unavailable during auto-bind: {e}"),
                )
                .with_stage("discovery"),
            );
            Ok(None)
        }
    }
}
