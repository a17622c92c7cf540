//! Identity store: bijective address ↔ anonymized ID mapping with lazy minting.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::error::IdentityError;
use crate::identity::address::{AnonymizedId, CorrespondentAddress};
use crate::identity::words::{IdGenerator, WordListGenerator};
use crate::store::{Database, PairInsert};

/// Default bound on mint attempts before giving up with `Exhausted`.
pub const DEFAULT_MAX_MINT_ATTEMPTS: u32 = 16;

/// Maps correspondent addresses to anonymized IDs and back.
#[derive(Clone)]
pub struct IdentityStore {
    db: Arc<dyn Database>,
    generator: Arc<dyn IdGenerator>,
    max_attempts: u32,
}

impl IdentityStore {
    /// Create a store that mints from the built-in word list.
    pub fn new(db: Arc<dyn Database>) -> Self {
        Self {
            db,
            generator: Arc::new(WordListGenerator),
            max_attempts: DEFAULT_MAX_MINT_ATTEMPTS,
        }
    }

    pub fn with_generator(mut self, generator: Arc<dyn IdGenerator>) -> Self {
        self.generator = generator;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Forward lookup. `None` means the address has never been seen.
    pub async fn resolve(
        &self,
        address: &CorrespondentAddress,
    ) -> Result<Option<AnonymizedId>, IdentityError> {
        let id = self
            .db
            .get_identity_by_address(&address.to_string())
            .await?
            .filter(|id| !id.is_empty())
            .map(AnonymizedId::new);
        Ok(id)
    }

    /// Reverse lookup. `None` means no correspondent owns this ID.
    pub async fn reverse_resolve(
        &self,
        id: &AnonymizedId,
    ) -> Result<Option<CorrespondentAddress>, IdentityError> {
        match self.db.get_address_by_identity(id.as_str()).await? {
            Some(raw) if !raw.is_empty() => Ok(Some(raw.parse()?)),
            _ => Ok(None),
        }
    }

    /// Mint a fresh ID for `address` and write the pair.
    ///
    /// Candidates that are already owned by another address are redrawn, up to
    /// `max_attempts` times. If the address was mapped in the meantime (another
    /// task won the race), the existing ID is returned instead.
    pub async fn mint(&self, address: &CorrespondentAddress) -> Result<AnonymizedId, IdentityError> {
        let key = address.to_string();

        for attempt in 1..=self.max_attempts {
            let candidate = self.generator.generate();

            // Cheap pre-check; the insert below is the authoritative one.
            if self.db.get_address_by_identity(&candidate).await?.is_some() {
                debug!(attempt, "Anonymized ID collision, redrawing");
                continue;
            }

            match self.db.insert_identity_pair(&key, &candidate).await? {
                PairInsert::Inserted => {
                    info!(anon_id = %candidate, attempt, "Minted anonymized ID");
                    return Ok(AnonymizedId::new(candidate));
                }
                PairInsert::AddressTaken(existing) => {
                    debug!(anon_id = %existing, "Address already minted concurrently");
                    return Ok(AnonymizedId::new(existing));
                }
                PairInsert::IdTaken => {
                    debug!(attempt, "Anonymized ID taken at insert, redrawing");
                }
            }
        }

        warn!(attempts = self.max_attempts, "Gave up minting an anonymized ID");
        Err(IdentityError::Exhausted {
            attempts: self.max_attempts,
        })
    }

    /// Resolve, minting on first contact.
    pub async fn resolve_or_mint(
        &self,
        address: &CorrespondentAddress,
    ) -> Result<AnonymizedId, IdentityError> {
        match self.resolve(address).await? {
            Some(id) => Ok(id),
            None => self.mint(address).await,
        }
    }
}
