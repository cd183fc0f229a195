//! Incremental, searchable address list for one backup wallet.
//!
//! Addresses are derived in batches from a persistent [`ChainKeyState`]
//! cursor, so growing the list never re-walks the chain from index 0.
//!
//! Concurrency model:
//! - one writer at a time, serialized by an async mutex around the cursor;
//!   [`AddressBook::generate_more`] gives up immediately if it is taken,
//!   [`AddressBook::reset`] waits for it
//! - published addresses sit behind a sync `RwLock` that is only held for
//!   the duration of a copy, so readers never wait on a running batch

use std::fmt;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use salvage_core::{AddressCodec, AddressIdentifier, AssetKind, ChainKeyState, RawPrivateKey};

use crate::backup::WalletBackupEntry;
use crate::error::WalletError;

/// Batch sizing for [`AddressBook`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GenerationConfig {
    /// Size of the first batch of an empty book.
    pub first_batch: usize,
    /// Upper bound on any single batch.
    pub max_batch: usize,
    /// Minimum number of keys written by an export.
    pub export_minimum: usize,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            first_batch: 100,
            max_batch: 10_000,
            export_minimum: 1_000,
        }
    }
}

impl GenerationConfig {
    /// Batch size for a book that currently holds `len` addresses:
    /// the first batch for an empty book, then double the length, capped.
    pub fn batch_size(&self, len: usize) -> usize {
        let size = if len == 0 {
            self.first_batch
        } else {
            len.saturating_mul(2)
        };
        size.min(self.max_batch).max(1)
    }
}

/// How many new addresses accumulate before they are published.
fn publish_interval(len: usize) -> usize {
    match len {
        0..50 => 1,
        50..100 => 5,
        100..200 => 10,
        200..300 => 20,
        300..500 => 50,
        500..1000 => 100,
        _ => 500,
    }
}

/// One generated address.
#[derive(Clone, PartialEq, Eq)]
pub struct DerivedAddress {
    /// Position in the ratchet sequence, from 0.
    pub index: u64,
    pub private_key: RawPrivateKey,
    /// Encoded address, or the encoder's error text if encoding failed.
    pub display_address: String,
    pub lowercase_address: String,
    pub serialized_private_key: String,
    /// Hash committed by the address; `None` for ETH and failed encodings.
    pub identifier: Option<AddressIdentifier>,
}

impl DerivedAddress {
    /// Encode `key`. Codec failures are recorded inline, never returned.
    pub fn derive(codec: &AddressCodec, asset: AssetKind, index: u64, key: RawPrivateKey) -> Self {
        let (display_address, identifier) = match codec.encode(asset, &key) {
            Ok(encoded) => (encoded.address, encoded.identifier),
            Err(err) => {
                warn!(%asset, index, %err, "address_book: encoding failed");
                (err.to_string(), None)
            }
        };
        Self {
            index,
            lowercase_address: display_address.to_lowercase(),
            serialized_private_key: AddressCodec::serialize_private_key(asset, &key),
            display_address,
            identifier,
            private_key: key,
        }
    }
}

impl fmt::Debug for DerivedAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DerivedAddress")
            .field("index", &self.index)
            .field("display_address", &self.display_address)
            .field("identifier", &self.identifier)
            .finish_non_exhaustive()
    }
}

/// Result of a [`AddressBook::generate_more`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationOutcome {
    /// A batch ran to completion.
    Generated { added: usize, total: usize },
    /// Another batch held the cursor; nothing was done.
    AlreadyRunning,
}

/// Cursor state, only touched under the generation lock.
struct Generator {
    asset: AssetKind,
    state: ChainKeyState,
}

/// What readers see.
struct Published {
    asset: AssetKind,
    addresses: Vec<DerivedAddress>,
}

/// Resumable address generator and search index for one asset.
pub struct AddressBook {
    codec: AddressCodec,
    config: GenerationConfig,
    generator: Mutex<Generator>,
    published: RwLock<Published>,
}

impl fmt::Debug for AddressBook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AddressBook")
            .field("asset", &self.asset())
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}

impl AddressBook {
    /// Empty book positioned at index 0 of `entry`'s chain.
    pub fn new(entry: &WalletBackupEntry, config: GenerationConfig) -> Self {
        Self {
            codec: AddressCodec::new(),
            config,
            generator: Mutex::new(Generator {
                asset: entry.asset,
                state: ChainKeyState::new(entry.root_secret.clone()),
            }),
            published: RwLock::new(Published {
                asset: entry.asset,
                addresses: Vec::new(),
            }),
        }
    }

    pub fn asset(&self) -> AssetKind {
        self.published.read().asset
    }

    pub fn config(&self) -> &GenerationConfig {
        &self.config
    }

    /// Number of published addresses.
    pub fn len(&self) -> usize {
        self.published.read().addresses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether a batch currently holds the cursor.
    pub fn is_generating(&self) -> bool {
        self.generator.try_lock().is_err()
    }

    /// Copy of every published address.
    pub fn snapshot(&self) -> Vec<DerivedAddress> {
        self.published.read().addresses.clone()
    }

    /// Derive up to `target_count` more addresses.
    ///
    /// The batch is `min(target_count, batch_size(len))`. Returns
    /// [`GenerationOutcome::AlreadyRunning`] without side effects if
    /// another batch is in flight.
    pub async fn generate_more(
        &self,
        target_count: usize,
    ) -> Result<GenerationOutcome, WalletError> {
        let Ok(mut generator) = self.generator.try_lock() else {
            debug!("address_book: batch already in flight");
            return Ok(GenerationOutcome::AlreadyRunning);
        };
        let added = self.run_batch(&mut generator, target_count).await?;
        Ok(GenerationOutcome::Generated {
            added,
            total: self.len(),
        })
    }

    /// One batch of the default size.
    pub async fn generate_next_batch(&self) -> Result<GenerationOutcome, WalletError> {
        let size = self.config.batch_size(self.len());
        self.generate_more(size).await
    }

    /// Grow the book to at least `count` addresses, waiting for any
    /// in-flight batch first.
    pub async fn generate_until(&self, count: usize) -> Result<usize, WalletError> {
        let mut generator = self.generator.lock().await;
        while self.len() < count {
            let missing = count - self.len();
            self.run_batch(&mut generator, missing).await?;
        }
        Ok(self.len())
    }

    /// Switch to `entry`'s chain: waits for the in-flight batch, then
    /// clears everything and restarts at index 0.
    pub async fn reset(&self, entry: &WalletBackupEntry) {
        let mut generator = self.generator.lock().await;
        generator.asset = entry.asset;
        generator.state = ChainKeyState::new(entry.root_secret.clone());
        let mut published = self.published.write();
        published.asset = entry.asset;
        published.addresses.clear();
        info!(asset = %entry.asset, "address_book: reset");
    }

    /// Case-insensitive substring search on the address. The query is used
    /// as typed; only an empty query matches everything.
    pub fn search(&self, query: &str) -> Vec<DerivedAddress> {
        let needle = query.to_lowercase();
        let published = self.published.read();
        if needle.is_empty() {
            return published.addresses.clone();
        }
        published
            .addresses
            .iter()
            .filter(|a| a.lowercase_address == needle || a.lowercase_address.contains(&needle))
            .cloned()
            .collect()
    }

    /// First published address committing to `id`.
    pub fn find_by_identifier(&self, id: &AddressIdentifier) -> Option<DerivedAddress> {
        self.published
            .read()
            .addresses
            .iter()
            .find(|a| a.identifier.as_ref() == Some(id))
            .cloned()
    }

    /// Serialized private keys of at least `minimum_count` addresses,
    /// one per line with a trailing newline.
    pub async fn export_all(&self, minimum_count: usize) -> Result<String, WalletError> {
        self.generate_until(minimum_count).await?;
        let published = self.published.read();
        let mut out = String::with_capacity(published.addresses.len() * 64);
        for address in &published.addresses {
            out.push_str(&address.serialized_private_key);
            out.push('\n');
        }
        Ok(out)
    }

    /// Export file name for `prefix`, e.g. `LocalCryptos_BTC_Seeds.txt`.
    pub fn export_file_name(&self, prefix: &str) -> String {
        format!("{prefix}_{}_Seeds.txt", self.asset().ticker())
    }

    /// Run [`export_all`](Self::export_all) with the configured minimum
    /// and write the result into `dir`.
    pub async fn write_export(&self, dir: &Path, prefix: &str) -> Result<PathBuf, WalletError> {
        let payload = self.export_all(self.config.export_minimum).await?;
        let path = dir.join(self.export_file_name(prefix));
        tokio::fs::write(&path, payload.as_bytes()).await?;
        info!(path = %path.display(), keys = self.len(), "address_book: exported");
        Ok(path)
    }

    /// Derive `target_count` capped by the batch size, publishing in
    /// sub-batches with a yield in between. Caller holds the lock.
    async fn run_batch(
        &self,
        generator: &mut Generator,
        target_count: usize,
    ) -> Result<usize, WalletError> {
        let start_len = self.len();
        let count = target_count.min(self.config.batch_size(start_len));
        let interval = publish_interval(start_len);
        let mut pending = Vec::with_capacity(interval);

        for i in 0..count {
            let (index, key) = match generator.state.step() {
                Ok(step) => step,
                Err(e) => {
                    self.publish(&mut pending);
                    return Err(e.into());
                }
            };
            pending.push(DerivedAddress::derive(&self.codec, generator.asset, index, key));

            if i + 1 == count || (start_len + i + 1) % interval == 0 {
                self.publish(&mut pending);
                tokio::task::yield_now().await;
            }
        }

        debug!(
            asset = %generator.asset,
            added = count,
            next_index = generator.state.index(),
            "address_book: batch done"
        );
        Ok(count)
    }

    fn publish(&self, pending: &mut Vec<DerivedAddress>) {
        if pending.is_empty() {
            return;
        }
        self.published.write().addresses.append(pending);
    }
}
