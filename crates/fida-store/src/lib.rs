//! redb-backed persistence for the ledger.
//!
//! `redb` is a single-writer embedded store: only one write transaction can
//! be open at a time for the whole database. That gives us durability and
//! crash safety for free, but it means the per-tenant write concurrency the
//! specification describes (independent tenants never contending) is
//! approximated rather than literal — `fida-core` serializes writers with
//! short-lived per-tenant locks above this layer, and each call here opens
//! and commits its own brief transaction.
#![deny(missing_docs)]

use std::path::Path;
use std::sync::Arc;

use fida_spec::{Checkpoint, EventHeader};
use redb::{Database, ReadableTable, TableDefinition};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised by the storage layer. Callers map these into
/// `FidaError::IntegrityViolation` or `FidaError::Internal` as appropriate;
/// this crate has no opinion on HTTP status codes.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The underlying redb engine reported an error opening or using the
    /// database file.
    #[error("storage backend error: {0}")]
    Backend(String),
    /// A record failed to (de)serialize. Indicates on-disk corruption or a
    /// schema mismatch, never a caller input problem.
    #[error("record codec error: {0}")]
    Codec(String),
    /// A uniqueness constraint that the engine is relying on was violated,
    /// e.g. two events claimed the same `(tenant_id, seq)`.
    #[error("integrity violation: {0}")]
    Integrity(String),
}

impl From<redb::Error> for StoreError {
    fn from(e: redb::Error) -> Self {
        StoreError::Backend(e.to_string())
    }
}
impl From<redb::DatabaseError> for StoreError {
    fn from(e: redb::DatabaseError) -> Self {
        StoreError::Backend(e.to_string())
    }
}
impl From<redb::TransactionError> for StoreError {
    fn from(e: redb::TransactionError) -> Self {
        StoreError::Backend(e.to_string())
    }
}
impl From<redb::TableError> for StoreError {
    fn from(e: redb::TableError) -> Self {
        StoreError::Backend(e.to_string())
    }
}
impl From<redb::StorageError> for StoreError {
    fn from(e: redb::StorageError) -> Self {
        StoreError::Backend(e.to_string())
    }
}
impl From<redb::CommitError> for StoreError {
    fn from(e: redb::CommitError) -> Self {
        StoreError::Backend(e.to_string())
    }
}
impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Codec(e.to_string())
    }
}

// Single-value tables, keyed by a fixed string.
const PLATFORM: TableDefinition<&str, &[u8]> = TableDefinition::new("platform");
const TENANTS: TableDefinition<&str, &[u8]> = TableDefinition::new("tenants");
const API_KEYS: TableDefinition<&str, &[u8]> = TableDefinition::new("api_keys");
// tenant_id -> be64(last_seq), the monotonic allocator's durable cursor.
const SEQ_CURSOR: TableDefinition<&str, u64> = TableDefinition::new("seq_cursor");
// "tenant_id\0seq" (zero-padded decimal) -> JSON-encoded EventRecord.
const EVENTS: TableDefinition<&str, &[u8]> = TableDefinition::new("events");
// event_hash -> "tenant_id\0seq", for idempotent replay and proof lookups.
const EVENTS_BY_HASH: TableDefinition<&str, &str> = TableDefinition::new("events_by_hash");
// "tenant_id\0idempotency_key" -> event_hash.
const IDEMPOTENCY: TableDefinition<&str, &str> = TableDefinition::new("idempotency");
// "tenant_id\0checkpoint_id" (zero-padded) -> JSON-encoded CheckpointRecord.
const CHECKPOINTS: TableDefinition<&str, &[u8]> = TableDefinition::new("checkpoints");
// "tenant_id\0checkpoint_id" -> JSON-encoded Vec<Vec<String>> (Merkle layers).
const MERKLE_LAYERS: TableDefinition<&str, &[u8]> = TableDefinition::new("merkle_layers");
// tenant_id -> 16 bytes: be64(last_checkpoint_id) || be64(last_to_seq).
const CHECKPOINT_CURSOR: TableDefinition<&str, &[u8]> = TableDefinition::new("checkpoint_cursor");
// "tenant_id\0event_id" -> seq, for the `/proof/{tenant}/{event_id}` lookup.
const EVENTS_BY_EVENT_ID: TableDefinition<&str, u64> = TableDefinition::new("events_by_event_id");

/// State of the one-time platform bootstrap.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformState {
    /// Whether `/admin/bootstrap/lock` has already been called.
    pub locked: bool,
    /// Platform signing key id.
    pub kid: String,
    /// Platform Ed25519 public key, base64url.
    pub public_key_b64u: String,
    /// AES-256-GCM-sealed platform signing seed.
    pub sealed_seed_b64u: String,
}

/// A registered tenant and its signing identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantRecord {
    /// Tenant identifier.
    pub tenant_id: String,
    /// Tenant's current signing key id.
    pub kid: String,
    /// Tenant Ed25519 public key, base64url.
    pub public_key_b64u: String,
    /// AES-256-GCM-sealed tenant signing seed.
    pub sealed_seed_b64u: String,
    /// UTC ISO-8601 creation timestamp.
    pub created_at: String,
}

/// A registered API key. The raw secret is never stored, only its hash.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKeyRecord {
    /// Key id (also the lookup key callers send as `x-api-key`'s prefix).
    pub key_id: String,
    /// SHA-256 hex digest of the full presented secret.
    pub secret_hash: String,
    /// Granted role.
    pub role: String,
    /// Tenant this key is scoped to; `None` for platform-wide admin keys.
    pub tenant_id: Option<String>,
    /// Whether the key has been revoked.
    pub revoked: bool,
}

/// A persisted ledger event: its signed header, hash, signature, and the
/// checkpoint bookkeeping filled in once it is batched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRecord {
    /// The signed header fields.
    #[serde(flatten)]
    pub header: EventHeader,
    /// `sha256_hex` of the canonicalized header.
    pub event_hash: String,
    /// Base64url Ed25519 signature over the raw digest of `event_hash`.
    pub signature_b64u: String,
    /// Idempotency key the caller supplied at issuance, if any.
    pub idempotency_key: Option<String>,
    /// Index of this event's hash among the leaves of the checkpoint batch
    /// that covers it, once one has been cut.
    pub leaf_index: Option<u64>,
    /// Id of the checkpoint covering this event, once one has been cut.
    pub checkpoint_id: Option<u64>,
}

fn event_key(tenant_id: &str, seq: u64) -> String {
    format!("{tenant_id}\0{seq:020}")
}

fn checkpoint_key(tenant_id: &str, checkpoint_id: u64) -> String {
    format!("{tenant_id}\0{checkpoint_id:020}")
}

fn scoped_key(tenant_id: &str, key: &str) -> String {
    format!("{tenant_id}\0{key}")
}

/// Handle to the ledger's redb database. Cheap to clone; all state lives
/// behind the inner `Arc<Database>`.
#[derive(Clone)]
pub struct Store {
    db: Arc<Database>,
}

impl Store {
    /// Open (creating if absent) the database file at `path`, ensuring all
    /// tables exist.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let db = Database::create(path)?;
        let write = db.begin_write()?;
        {
            write.open_table(PLATFORM)?;
            write.open_table(TENANTS)?;
            write.open_table(API_KEYS)?;
            write.open_table(SEQ_CURSOR)?;
            write.open_table(EVENTS)?;
            write.open_table(EVENTS_BY_HASH)?;
            write.open_table(IDEMPOTENCY)?;
            write.open_table(CHECKPOINTS)?;
            write.open_table(MERKLE_LAYERS)?;
            write.open_table(CHECKPOINT_CURSOR)?;
            write.open_table(EVENTS_BY_EVENT_ID)?;
        }
        write.commit()?;
        Ok(Self { db: Arc::new(db) })
    }

    /// The `(last_checkpoint_id, last_to_seq)` high-water mark for a
    /// tenant, or `(0, 0)` if no checkpoint has ever been cut.
    pub fn checkpoint_cursor(&self, tenant_id: &str) -> Result<(u64, u64), StoreError> {
        let read = self.db.begin_read()?;
        let table = read.open_table(CHECKPOINT_CURSOR)?;
        match table.get(tenant_id)? {
            Some(v) => {
                let bytes = v.value();
                let id = u64::from_be_bytes(bytes[0..8].try_into().unwrap());
                let to_seq = u64::from_be_bytes(bytes[8..16].try_into().unwrap());
                Ok((id, to_seq))
            }
            None => Ok((0, 0)),
        }
    }

    /// Read the platform bootstrap state, if bootstrap has run.
    pub fn get_platform_state(&self) -> Result<Option<PlatformState>, StoreError> {
        let read = self.db.begin_read()?;
        let table = read.open_table(PLATFORM)?;
        match table.get("state")? {
            Some(v) => Ok(Some(serde_json::from_slice(v.value())?)),
            None => Ok(None),
        }
    }

    /// Write the platform bootstrap state. Called once by `/admin/bootstrap`
    /// and again (with `locked = true`) by `/admin/bootstrap/lock`.
    pub fn put_platform_state(&self, state: &PlatformState) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec(state)?;
        let write = self.db.begin_write()?;
        {
            let mut table = write.open_table(PLATFORM)?;
            table.insert("state", bytes.as_slice())?;
        }
        write.commit()?;
        Ok(())
    }

    /// Insert a new tenant. Returns `StoreError::Integrity` if the tenant id
    /// already exists.
    pub fn insert_tenant(&self, tenant: &TenantRecord) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec(tenant)?;
        let write = self.db.begin_write()?;
        {
            let mut table = write.open_table(TENANTS)?;
            if table.get(tenant.tenant_id.as_str())?.is_some() {
                return Err(StoreError::Integrity(format!(
                    "tenant {} already exists",
                    tenant.tenant_id
                )));
            }
            table.insert(tenant.tenant_id.as_str(), bytes.as_slice())?;
            let mut seq = write.open_table(SEQ_CURSOR)?;
            seq.insert(tenant.tenant_id.as_str(), 0u64)?;
        }
        write.commit()?;
        Ok(())
    }

    /// Fetch a tenant by id.
    pub fn get_tenant(&self, tenant_id: &str) -> Result<Option<TenantRecord>, StoreError> {
        let read = self.db.begin_read()?;
        let table = read.open_table(TENANTS)?;
        match table.get(tenant_id)? {
            Some(v) => Ok(Some(serde_json::from_slice(v.value())?)),
            None => Ok(None),
        }
    }

    /// Insert a new API key. Returns `StoreError::Integrity` on a duplicate
    /// key id.
    pub fn insert_api_key(&self, key: &ApiKeyRecord) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec(key)?;
        let write = self.db.begin_write()?;
        {
            let mut table = write.open_table(API_KEYS)?;
            if table.get(key.key_id.as_str())?.is_some() {
                return Err(StoreError::Integrity(format!(
                    "api key {} already exists",
                    key.key_id
                )));
            }
            table.insert(key.key_id.as_str(), bytes.as_slice())?;
        }
        write.commit()?;
        Ok(())
    }

    /// Fetch an API key record by its key id.
    pub fn get_api_key(&self, key_id: &str) -> Result<Option<ApiKeyRecord>, StoreError> {
        let read = self.db.begin_read()?;
        let table = read.open_table(API_KEYS)?;
        match table.get(key_id)? {
            Some(v) => Ok(Some(serde_json::from_slice(v.value())?)),
            None => Ok(None),
        }
    }

    /// Read the next sequence number that would be allocated for `tenant_id`
    /// without allocating it. Used by callers that already hold the
    /// per-tenant allocation lock.
    pub fn peek_next_seq(&self, tenant_id: &str) -> Result<u64, StoreError> {
        let read = self.db.begin_read()?;
        let table = read.open_table(SEQ_CURSOR)?;
        Ok(table.get(tenant_id)?.map(|v| v.value()).unwrap_or(0) + 1)
    }

    /// Atomically allocate the next sequence number for `tenant_id` and
    /// persist the event in the same transaction, along with its hash and
    /// idempotency index. The caller is responsible for holding a per-tenant
    /// lock so this is never invoked concurrently for the same tenant.
    pub fn append_event(&self, record: &EventRecord) -> Result<(), StoreError> {
        let tenant_id = &record.header.tenant_id;
        let write = self.db.begin_write()?;
        {
            let mut seq_table = write.open_table(SEQ_CURSOR)?;
            let current = seq_table.get(tenant_id.as_str())?.map(|v| v.value()).unwrap_or(0);
            if record.header.seq != current + 1 {
                return Err(StoreError::Integrity(format!(
                    "out-of-order seq for tenant {tenant_id}: expected {}, got {}",
                    current + 1,
                    record.header.seq
                )));
            }
            seq_table.insert(tenant_id.as_str(), record.header.seq)?;

            let mut events = write.open_table(EVENTS)?;
            let key = event_key(tenant_id, record.header.seq);
            let bytes = serde_json::to_vec(record)?;
            events.insert(key.as_str(), bytes.as_slice())?;

            let mut by_hash = write.open_table(EVENTS_BY_HASH)?;
            by_hash.insert(record.event_hash.as_str(), key.as_str())?;

            let mut by_event_id = write.open_table(EVENTS_BY_EVENT_ID)?;
            let eid_key = scoped_key(tenant_id, &record.header.event_id);
            by_event_id.insert(eid_key.as_str(), record.header.seq)?;

            if let Some(idem) = &record.idempotency_key {
                let mut idem_table = write.open_table(IDEMPOTENCY)?;
                let ik = scoped_key(tenant_id, idem);
                idem_table.insert(ik.as_str(), record.event_hash.as_str())?;
            }
        }
        write.commit()?;
        Ok(())
    }

    /// Look up a prior event by its tenant-scoped idempotency key, for
    /// same-transaction replay short-circuit on `/issue`.
    pub fn find_by_idempotency_key(
        &self,
        tenant_id: &str,
        key: &str,
    ) -> Result<Option<EventRecord>, StoreError> {
        let read = self.db.begin_read()?;
        let idem_table = read.open_table(IDEMPOTENCY)?;
        let ik = scoped_key(tenant_id, key);
        let event_hash = match idem_table.get(ik.as_str())? {
            Some(v) => v.value().to_string(),
            None => return Ok(None),
        };
        drop(idem_table);
        self.get_event_by_hash_in(&read, &event_hash)
    }

    /// Fetch an event by its `(tenant_id, seq)` pair.
    pub fn get_event(&self, tenant_id: &str, seq: u64) -> Result<Option<EventRecord>, StoreError> {
        let read = self.db.begin_read()?;
        let table = read.open_table(EVENTS)?;
        let key = event_key(tenant_id, seq);
        match table.get(key.as_str())? {
            Some(v) => Ok(Some(serde_json::from_slice(v.value())?)),
            None => Ok(None),
        }
    }

    /// Fetch an event by its `event_hash`.
    pub fn get_event_by_hash(&self, event_hash: &str) -> Result<Option<EventRecord>, StoreError> {
        let read = self.db.begin_read()?;
        self.get_event_by_hash_in(&read, event_hash)
    }

    /// Fetch an event by its tenant-scoped `event_id`, for `/proof`.
    pub fn get_event_by_event_id(
        &self,
        tenant_id: &str,
        event_id: &str,
    ) -> Result<Option<EventRecord>, StoreError> {
        let read = self.db.begin_read()?;
        let index = read.open_table(EVENTS_BY_EVENT_ID)?;
        let key = scoped_key(tenant_id, event_id);
        let seq = match index.get(key.as_str())? {
            Some(v) => v.value(),
            None => return Ok(None),
        };
        drop(index);
        let events = read.open_table(EVENTS)?;
        let event_key_str = event_key(tenant_id, seq);
        match events.get(event_key_str.as_str())? {
            Some(v) => Ok(Some(serde_json::from_slice(v.value())?)),
            None => Ok(None),
        }
    }

    fn get_event_by_hash_in(
        &self,
        read: &redb::ReadTransaction<'_>,
        event_hash: &str,
    ) -> Result<Option<EventRecord>, StoreError> {
        let by_hash = read.open_table(EVENTS_BY_HASH)?;
        let key = match by_hash.get(event_hash)? {
            Some(v) => v.value().to_string(),
            None => return Ok(None),
        };
        let events = read.open_table(EVENTS)?;
        match events.get(key.as_str())? {
            Some(v) => Ok(Some(serde_json::from_slice(v.value())?)),
            None => Ok(None),
        }
    }

    /// List events for `tenant_id` with `seq > after_seq`, up to `limit`,
    /// in ascending sequence order. Used by `/export`.
    pub fn list_events_after(
        &self,
        tenant_id: &str,
        after_seq: u64,
        limit: usize,
    ) -> Result<Vec<EventRecord>, StoreError> {
        let read = self.db.begin_read()?;
        let table = read.open_table(EVENTS)?;
        let start = event_key(tenant_id, after_seq + 1);
        let end = format!("{tenant_id}\u{1}");
        let mut out = Vec::with_capacity(limit);
        for entry in table.range(start.as_str()..end.as_str())? {
            let (_, v) = entry?;
            out.push(serde_json::from_slice(v.value())?);
            if out.len() >= limit {
                break;
            }
        }
        Ok(out)
    }

    /// Events for `tenant_id` with `from_seq <= seq <= to_seq`, ascending.
    /// Used by the checkpoint engine to gather a batch.
    pub fn list_events_range(
        &self,
        tenant_id: &str,
        from_seq: u64,
        to_seq: u64,
    ) -> Result<Vec<EventRecord>, StoreError> {
        let read = self.db.begin_read()?;
        let table = read.open_table(EVENTS)?;
        let start = event_key(tenant_id, from_seq);
        let end = event_key(tenant_id, to_seq + 1);
        let mut out = Vec::new();
        for entry in table.range(start.as_str()..end.as_str())? {
            let (_, v) = entry?;
            out.push(serde_json::from_slice(v.value())?);
        }
        Ok(out)
    }

    /// Persist a freshly cut checkpoint, its Merkle layers, and backfill
    /// `leaf_index`/`checkpoint_id` onto each covered event, all in one
    /// transaction.
    pub fn commit_checkpoint(
        &self,
        checkpoint: &Checkpoint,
        layers: &[Vec<String>],
        covered_leaf_hashes: &[String],
    ) -> Result<(), StoreError> {
        let tenant_id = &checkpoint.header.tenant_id;
        let write = self.db.begin_write()?;
        {
            let mut cp_table = write.open_table(CHECKPOINTS)?;
            let key = checkpoint_key(tenant_id, checkpoint.id);
            cp_table.insert(key.as_str(), serde_json::to_vec(checkpoint)?.as_slice())?;

            let mut layer_table = write.open_table(MERKLE_LAYERS)?;
            layer_table.insert(key.as_str(), serde_json::to_vec(layers)?.as_slice())?;

            let mut cursor_table = write.open_table(CHECKPOINT_CURSOR)?;
            let mut cursor_bytes = [0u8; 16];
            cursor_bytes[0..8].copy_from_slice(&checkpoint.id.to_be_bytes());
            cursor_bytes[8..16].copy_from_slice(&checkpoint.header.to_seq.to_be_bytes());
            cursor_table.insert(tenant_id.as_str(), cursor_bytes.as_slice())?;

            let mut events = write.open_table(EVENTS)?;
            for (index, leaf_hash) in covered_leaf_hashes.iter().enumerate() {
                let by_hash = write.open_table(EVENTS_BY_HASH)?;
                let event_key_str = match by_hash.get(leaf_hash.as_str())? {
                    Some(v) => v.value().to_string(),
                    None => {
                        return Err(StoreError::Integrity(format!(
                            "checkpoint covers unknown event hash {leaf_hash}"
                        )))
                    }
                };
                drop(by_hash);
                let mut record: EventRecord = match events.get(event_key_str.as_str())? {
                    Some(v) => serde_json::from_slice(v.value())?,
                    None => {
                        return Err(StoreError::Integrity(format!(
                            "dangling event index entry for {leaf_hash}"
                        )))
                    }
                };
                record.leaf_index = Some(index as u64);
                record.checkpoint_id = Some(checkpoint.id);
                events.insert(event_key_str.as_str(), serde_json::to_vec(&record)?.as_slice())?;
            }
        }
        write.commit()?;
        Ok(())
    }

    /// Fetch a checkpoint by tenant and id.
    pub fn get_checkpoint(
        &self,
        tenant_id: &str,
        checkpoint_id: u64,
    ) -> Result<Option<Checkpoint>, StoreError> {
        let read = self.db.begin_read()?;
        let table = read.open_table(CHECKPOINTS)?;
        let key = checkpoint_key(tenant_id, checkpoint_id);
        match table.get(key.as_str())? {
            Some(v) => Ok(Some(serde_json::from_slice(v.value())?)),
            None => Ok(None),
        }
    }

    /// Fetch the persisted Merkle layers for a checkpoint, for proof
    /// reconstruction.
    pub fn get_merkle_layers(
        &self,
        tenant_id: &str,
        checkpoint_id: u64,
    ) -> Result<Option<Vec<Vec<String>>>, StoreError> {
        let read = self.db.begin_read()?;
        let table = read.open_table(MERKLE_LAYERS)?;
        let key = checkpoint_key(tenant_id, checkpoint_id);
        match table.get(key.as_str())? {
            Some(v) => Ok(Some(serde_json::from_slice(v.value())?)),
            None => Ok(None),
        }
    }
}
