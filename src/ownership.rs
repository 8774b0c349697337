// 10.0 ownership.rs: transferable position identities.
// arena of records keyed by PositionId with an owner and a set of module locks.
// a locked position cannot change hands until every module that locked it unlocks.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::custody::LedgerError;
use crate::types::{AccountId, PositionId};
use crate::vault::ModuleKey;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionToken {
    pub owner: AccountId,
    pub locks: BTreeSet<ModuleKey>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionRegistry {
    tokens: BTreeMap<PositionId, PositionToken>,
    next_id: u64,
    burned: u64,
}

impl Default for PositionRegistry {
    fn default() -> Self {
        Self {
            tokens: BTreeMap::new(),
            next_id: 1,
            burned: 0,
        }
    }
}

impl PositionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn mint(&mut self, owner: AccountId) -> PositionId {
        let id = PositionId(self.next_id);
        self.next_id += 1;
        self.tokens.insert(
            id,
            PositionToken {
                owner,
                locks: BTreeSet::new(),
            },
        );
        id
    }

    pub(crate) fn burn(&mut self, id: PositionId) -> Result<PositionToken, LedgerError> {
        let token = self.tokens.remove(&id).ok_or(LedgerError::UnknownPosition(id))?;
        self.burned += 1;
        Ok(token)
    }

    pub fn owner_of(&self, id: PositionId) -> Result<AccountId, LedgerError> {
        self.tokens
            .get(&id)
            .map(|t| t.owner)
            .ok_or(LedgerError::UnknownPosition(id))
    }

    pub fn ensure_owner(&self, id: PositionId, account: AccountId) -> Result<(), LedgerError> {
        if self.owner_of(id)? != account {
            return Err(LedgerError::NotOwner {
                account,
                position: id,
            });
        }
        Ok(())
    }

    pub fn is_locked(&self, id: PositionId) -> bool {
        self.tokens.get(&id).is_some_and(|t| !t.locks.is_empty())
    }

    pub fn is_locked_by(&self, id: PositionId, module: ModuleKey) -> bool {
        self.tokens.get(&id).is_some_and(|t| t.locks.contains(&module))
    }

    pub fn transfer(&mut self, from: AccountId, to: AccountId, id: PositionId) -> Result<(), LedgerError> {
        self.ensure_owner(id, from)?;
        let token = self.tokens.get_mut(&id).ok_or(LedgerError::UnknownPosition(id))?;
        if !token.locks.is_empty() {
            return Err(LedgerError::PositionLocked { position: id });
        }
        token.owner = to;
        Ok(())
    }

    pub(crate) fn lock(&mut self, id: PositionId, module: ModuleKey) -> Result<(), LedgerError> {
        let token = self.tokens.get_mut(&id).ok_or(LedgerError::UnknownPosition(id))?;
        token.locks.insert(module);
        Ok(())
    }

    pub(crate) fn unlock(&mut self, id: PositionId, module: ModuleKey) -> Result<(), LedgerError> {
        let token = self.tokens.get_mut(&id).ok_or(LedgerError::UnknownPosition(id))?;
        if !token.locks.remove(&module) {
            return Err(LedgerError::NotLockedByModule { position: id, module });
        }
        Ok(())
    }

    pub fn positions_of(&self, owner: AccountId) -> Vec<PositionId> {
        self.tokens
            .iter()
            .filter(|(_, t)| t.owner == owner)
            .map(|(id, _)| *id)
            .collect()
    }

    pub fn ids(&self) -> impl Iterator<Item = PositionId> + '_ {
        self.tokens.keys().copied()
    }

    pub fn live_count(&self) -> usize {
        self.tokens.len()
    }

    pub fn burned_count(&self) -> u64 {
        self.burned
    }
}
