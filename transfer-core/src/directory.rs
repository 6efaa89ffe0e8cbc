//! Account Directory: read path for account lookup
//!
//! Pure reads over the Ledger Store's current state. Values read here are
//! advisory: the orchestrator re-validates under lock before making any
//! mutating decision. The directory also owns account-number generation;
//! candidates are collision-checked against the number index and the
//! authoritative uniqueness check happens at insert.

use crate::{
    error::{Error, Result},
    storage::Storage,
    types::{Account, AccountId, AccountNumber, UserId},
};
use rand::Rng;
use std::sync::Arc;

/// Digits in a generated account number (after the `ACC` prefix)
const NUMBER_DIGITS: usize = 12;

/// Read path over shared storage
pub struct AccountDirectory {
    storage: Arc<Storage>,
    number_attempts: u32,
}

impl AccountDirectory {
    /// Create a directory over shared storage
    pub fn new(storage: Arc<Storage>, number_attempts: u32) -> Self {
        Self {
            storage,
            number_attempts,
        }
    }

    /// Look up an account by its customer-facing number
    pub fn find_by_number(&self, number: &AccountNumber) -> Result<Option<Account>> {
        match self.storage.account_id_by_number(number)? {
            Some(id) => self.storage.get_account(id),
            None => Ok(None),
        }
    }

    /// Look up an account by ID
    pub fn find_by_id(&self, id: AccountId) -> Result<Option<Account>> {
        self.storage.get_account(id)
    }

    /// List a user's accounts
    pub fn list_by_user(&self, user_id: UserId) -> Result<Vec<Account>> {
        let mut accounts = Vec::new();
        for id in self.storage.account_ids_by_user(user_id)? {
            if let Some(account) = self.storage.get_account(id)? {
                accounts.push(account);
            }
        }
        Ok(accounts)
    }

    /// Generate a globally-unique account number candidate.
    ///
    /// Collisions against the number index are retried up to the
    /// configured attempt count; exhaustion is an error, never a silently
    /// accepted duplicate.
    pub fn generate_number(&self) -> Result<AccountNumber> {
        let mut rng = rand::thread_rng();

        for _ in 0..self.number_attempts {
            let mut number = String::with_capacity(3 + NUMBER_DIGITS);
            number.push_str("ACC");
            for _ in 0..NUMBER_DIGITS {
                number.push(char::from(b'0' + rng.gen_range(0..10u8)));
            }

            let candidate = AccountNumber::new(number);
            if self.storage.account_id_by_number(&candidate)?.is_none() {
                return Ok(candidate);
            }
        }

        Err(Error::AccountNumberExhausted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AccountType;
    use crate::Config;
    use tempfile::TempDir;

    fn test_directory() -> (AccountDirectory, Arc<Storage>, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.data_dir = temp_dir.path().to_path_buf();
        let storage = Arc::new(Storage::open(&config).unwrap());
        (AccountDirectory::new(storage.clone(), 8), storage, temp_dir)
    }

    #[test]
    fn test_find_by_number_and_id() {
        let (directory, storage, _temp) = test_directory();

        let account = Account::open(
            UserId::generate(),
            AccountNumber::new("ACC000000000001"),
            AccountType::Savings,
        );
        storage.create_account(&account).unwrap();

        let by_number = directory.find_by_number(&account.number).unwrap().unwrap();
        assert_eq!(by_number.id, account.id);

        let by_id = directory.find_by_id(account.id).unwrap().unwrap();
        assert_eq!(by_id.number, account.number);

        assert!(directory
            .find_by_number(&AccountNumber::new("ACC999999999999"))
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_list_by_user() {
        let (directory, storage, _temp) = test_directory();

        let user_id = UserId::generate();
        for i in 0..2 {
            let mut account = Account::open(
                user_id,
                AccountNumber::new(format!("ACC00000000000{}", i)),
                AccountType::Checking,
            );
            account.user_id = user_id;
            storage.create_account(&account).unwrap();
        }

        let accounts = directory.list_by_user(user_id).unwrap();
        assert_eq!(accounts.len(), 2);
        assert!(accounts.iter().all(|a| a.user_id == user_id));
    }

    #[test]
    fn test_generated_numbers_have_expected_shape() {
        let (directory, _storage, _temp) = test_directory();

        let number = directory.generate_number().unwrap();
        let s = number.as_str();
        assert!(s.starts_with("ACC"));
        assert_eq!(s.len(), 3 + NUMBER_DIGITS);
        assert!(s[3..].chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn test_generation_skips_taken_numbers() {
        let (directory, storage, _temp) = test_directory();

        // Occupy a number, then confirm generation still succeeds and
        // never returns a taken candidate.
        let taken = directory.generate_number().unwrap();
        let account = Account::open(UserId::generate(), taken.clone(), AccountType::Checking);
        storage.create_account(&account).unwrap();

        for _ in 0..16 {
            let fresh = directory.generate_number().unwrap();
            assert_ne!(fresh, taken);
        }
    }
}
