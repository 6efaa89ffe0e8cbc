//! Storage layer using RocksDB
//!
//! # Column Families
//!
//! - `accounts` - Account rows (key: account_id)
//! - `transfers` - Transfer records (key: transfer_id)
//! - `indices` - Secondary indices for fast lookups
//!
//! # Index keys
//!
//! - `num|<account_number>` -> account_id (unique-number constraint)
//! - `usr|<user_id><account_id>` -> empty (list accounts by user)
//! - `idk|<idempotency_key>` -> transfer_id (unique-key constraint)
//! - `act|<account_id><reversed_ts><transfer_id>` -> empty
//!   (recent-transaction queries, most-recent-first)

use crate::{
    error::{Error, Result},
    types::{Account, AccountId, AccountNumber, TransferId, TransferRecord, UserId},
    Config,
};
use rocksdb::{BoundColumnFamily, ColumnFamilyDescriptor, Options, WriteBatch, DB};
use std::sync::Arc;
use uuid::Uuid;

/// Column family names
const CF_ACCOUNTS: &str = "accounts";
const CF_TRANSFERS: &str = "transfers";
const CF_INDICES: &str = "indices";

/// Index key tags
const IDX_NUMBER: &[u8] = b"num|";
const IDX_USER: &[u8] = b"usr|";
const IDX_IDEMPOTENCY: &[u8] = b"idk|";
const IDX_ACCOUNT_TRANSFER: &[u8] = b"act|";

/// Storage wrapper for RocksDB
pub struct Storage {
    db: Arc<DB>,
}

impl Storage {
    /// Open or create database
    pub fn open(config: &Config) -> Result<Self> {
        let path = &config.data_dir;

        std::fs::create_dir_all(path)?;

        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);

        // Tuning from config
        db_opts.set_write_buffer_size(config.rocksdb.write_buffer_size_mb * 1024 * 1024);
        db_opts.set_max_write_buffer_number(config.rocksdb.max_write_buffer_number);
        db_opts.set_target_file_size_base(config.rocksdb.target_file_size_mb * 1024 * 1024);
        db_opts.set_max_background_jobs(config.rocksdb.max_background_jobs);

        let cf_descriptors = vec![
            ColumnFamilyDescriptor::new(CF_ACCOUNTS, Self::cf_options_accounts()),
            ColumnFamilyDescriptor::new(CF_TRANSFERS, Self::cf_options_transfers()),
            ColumnFamilyDescriptor::new(CF_INDICES, Self::cf_options_indices()),
        ];

        let db = DB::open_cf_descriptors(&db_opts, path, cf_descriptors)?;

        tracing::info!("Opened RocksDB at {:?}", path);

        Ok(Self { db: Arc::new(db) })
    }

    // Column family options

    fn cf_options_accounts() -> Options {
        let mut opts = Options::default();
        // Accounts are frequently read, use LZ4 for speed
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        opts
    }

    fn cf_options_transfers() -> Options {
        let mut opts = Options::default();
        opts.set_compression_type(rocksdb::DBCompressionType::Zstd);
        opts
    }

    fn cf_options_indices() -> Options {
        let mut opts = Options::default();
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        // Indices benefit from bloom filters
        let mut block_opts = rocksdb::BlockBasedOptions::default();
        block_opts.set_bloom_filter(10.0, false);
        opts.set_block_based_table_factory(&block_opts);
        opts
    }

    fn cf_handle(&self, name: &str) -> Result<Arc<BoundColumnFamily<'_>>> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| Error::Storage(format!("Column family {} not found", name)))
    }

    // Account operations

    /// Insert a new account with its number and user indices (atomic).
    ///
    /// Fails with `DuplicateAccountNumber` if the number index already has
    /// an entry, preserving the unique-number constraint.
    pub fn create_account(&self, account: &Account) -> Result<()> {
        if self.account_id_by_number(&account.number)?.is_some() {
            return Err(Error::DuplicateAccountNumber(account.number.to_string()));
        }

        let mut batch = WriteBatch::default();

        let cf_accounts = self.cf_handle(CF_ACCOUNTS)?;
        batch.put_cf(&cf_accounts, account.id.as_bytes(), bincode::serialize(account)?);

        let cf_indices = self.cf_handle(CF_INDICES)?;
        batch.put_cf(
            &cf_indices,
            Self::index_key_number(&account.number),
            account.id.as_bytes(),
        );
        batch.put_cf(
            &cf_indices,
            Self::index_key_user_account(account.user_id, account.id),
            [],
        );

        self.db.write(batch)?;

        Ok(())
    }

    /// Overwrite a single account row
    pub fn put_account(&self, account: &Account) -> Result<()> {
        let cf = self.cf_handle(CF_ACCOUNTS)?;
        self.db
            .put_cf(&cf, account.id.as_bytes(), bincode::serialize(account)?)?;
        Ok(())
    }

    /// Overwrite two account rows in one atomic batch.
    ///
    /// This is the commit step of a transfer apply: either both rows land
    /// or neither does.
    pub fn put_account_pair(&self, first: &Account, second: &Account) -> Result<()> {
        let cf = self.cf_handle(CF_ACCOUNTS)?;

        let mut batch = WriteBatch::default();
        batch.put_cf(&cf, first.id.as_bytes(), bincode::serialize(first)?);
        batch.put_cf(&cf, second.id.as_bytes(), bincode::serialize(second)?);

        self.db.write(batch)?;

        Ok(())
    }

    /// Get account by ID
    pub fn get_account(&self, id: AccountId) -> Result<Option<Account>> {
        let cf = self.cf_handle(CF_ACCOUNTS)?;
        match self.db.get_cf(&cf, id.as_bytes())? {
            Some(value) => Ok(Some(bincode::deserialize(&value)?)),
            None => Ok(None),
        }
    }

    /// Resolve an account number to its account ID
    pub fn account_id_by_number(&self, number: &AccountNumber) -> Result<Option<AccountId>> {
        let cf = self.cf_handle(CF_INDICES)?;
        match self.db.get_cf(&cf, Self::index_key_number(number))? {
            Some(value) => Ok(Some(Self::parse_id_value(&value).map(AccountId::from_uuid)?)),
            None => Ok(None),
        }
    }

    /// List account IDs owned by a user
    pub fn account_ids_by_user(&self, user_id: UserId) -> Result<Vec<AccountId>> {
        let cf = self.cf_handle(CF_INDICES)?;

        let mut prefix = IDX_USER.to_vec();
        prefix.extend_from_slice(user_id.as_bytes());

        let mut ids = Vec::new();
        let iter = self.db.prefix_iterator_cf(&cf, &prefix);
        for item in iter {
            let (key, _) = item?;
            if !key.starts_with(&prefix) {
                break;
            }
            // Key layout: tag(4) || user(16) || account(16)
            if key.len() >= 36 {
                ids.push(AccountId::from_uuid(Self::parse_id_value(&key[20..36])?));
            }
        }

        Ok(ids)
    }

    // Transfer operations

    /// Append a transfer record with its idempotency-key and per-account
    /// indices (atomic). Re-appending the same record is a natural no-op.
    pub fn append_transfer(&self, record: &TransferRecord) -> Result<()> {
        let mut batch = WriteBatch::default();

        let cf_transfers = self.cf_handle(CF_TRANSFERS)?;
        batch.put_cf(&cf_transfers, record.id.as_bytes(), bincode::serialize(record)?);

        let cf_indices = self.cf_handle(CF_INDICES)?;
        batch.put_cf(
            &cf_indices,
            Self::index_key_idempotency(&record.idempotency_key),
            record.id.as_bytes(),
        );
        batch.put_cf(
            &cf_indices,
            Self::index_key_account_transfer(record.from_account, record),
            [],
        );
        batch.put_cf(
            &cf_indices,
            Self::index_key_account_transfer(record.to_account, record),
            [],
        );

        self.db.write(batch)?;

        Ok(())
    }

    /// Overwrite a transfer record (status update; indices unchanged)
    pub fn put_transfer(&self, record: &TransferRecord) -> Result<()> {
        let cf = self.cf_handle(CF_TRANSFERS)?;
        self.db
            .put_cf(&cf, record.id.as_bytes(), bincode::serialize(record)?)?;
        Ok(())
    }

    /// Get transfer by ID
    pub fn get_transfer(&self, id: TransferId) -> Result<Option<TransferRecord>> {
        let cf = self.cf_handle(CF_TRANSFERS)?;
        match self.db.get_cf(&cf, id.as_bytes())? {
            Some(value) => Ok(Some(bincode::deserialize(&value)?)),
            None => Ok(None),
        }
    }

    /// Resolve an idempotency key to its transfer ID
    pub fn transfer_id_by_idempotency_key(&self, key: &str) -> Result<Option<TransferId>> {
        let cf = self.cf_handle(CF_INDICES)?;
        match self.db.get_cf(&cf, Self::index_key_idempotency(key))? {
            Some(value) => Ok(Some(Self::parse_id_value(&value).map(TransferId::from_uuid)?)),
            None => Ok(None),
        }
    }

    /// List transfers touching an account, most recent first
    pub fn transfers_for_account(
        &self,
        account_id: AccountId,
        limit: usize,
    ) -> Result<Vec<TransferRecord>> {
        let cf = self.cf_handle(CF_INDICES)?;

        let mut prefix = IDX_ACCOUNT_TRANSFER.to_vec();
        prefix.extend_from_slice(account_id.as_bytes());

        let mut records = Vec::new();
        let iter = self.db.prefix_iterator_cf(&cf, &prefix);
        for item in iter {
            let (key, _) = item?;
            if !key.starts_with(&prefix) {
                break;
            }
            if records.len() >= limit {
                break;
            }
            // Key layout: tag(4) || account(16) || reversed_ts(8) || transfer(16)
            if key.len() >= 44 {
                let transfer_id = TransferId::from_uuid(Self::parse_id_value(&key[28..44])?);
                if let Some(record) = self.get_transfer(transfer_id)? {
                    records.push(record);
                }
            }
        }

        Ok(records)
    }

    // Index key helpers

    fn index_key_number(number: &AccountNumber) -> Vec<u8> {
        let mut key = IDX_NUMBER.to_vec();
        key.extend_from_slice(number.as_str().as_bytes());
        key
    }

    fn index_key_user_account(user_id: UserId, account_id: AccountId) -> Vec<u8> {
        let mut key = IDX_USER.to_vec();
        key.extend_from_slice(user_id.as_bytes());
        key.extend_from_slice(account_id.as_bytes());
        key
    }

    fn index_key_idempotency(idempotency_key: &str) -> Vec<u8> {
        let mut key = IDX_IDEMPOTENCY.to_vec();
        key.extend_from_slice(idempotency_key.as_bytes());
        key
    }

    /// Big-endian reversed timestamp sorts most-recent-first under a
    /// forward prefix scan.
    fn index_key_account_transfer(account_id: AccountId, record: &TransferRecord) -> Vec<u8> {
        let ts = record
            .requested_at
            .timestamp_nanos_opt()
            .unwrap_or(0)
            .max(0) as u64;

        let mut key = IDX_ACCOUNT_TRANSFER.to_vec();
        key.extend_from_slice(account_id.as_bytes());
        key.extend_from_slice(&(u64::MAX - ts).to_be_bytes());
        key.extend_from_slice(record.id.as_bytes());
        key
    }

    fn parse_id_value(value: &[u8]) -> Result<Uuid> {
        let bytes: [u8; 16] = value
            .try_into()
            .map_err(|_| Error::Storage("Malformed index value".to_string()))?;
        Ok(Uuid::from_bytes(bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AccountType, TransferRecord};
    use rust_decimal::Decimal;
    use tempfile::TempDir;

    fn test_storage() -> (Storage, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.data_dir = temp_dir.path().to_path_buf();
        (Storage::open(&config).unwrap(), temp_dir)
    }

    fn test_account(number: &str) -> Account {
        Account::open(
            UserId::generate(),
            AccountNumber::new(number),
            AccountType::Checking,
        )
    }

    #[test]
    fn test_create_and_get_account() {
        let (storage, _temp) = test_storage();

        let account = test_account("ACC000000000001");
        storage.create_account(&account).unwrap();

        let retrieved = storage.get_account(account.id).unwrap().unwrap();
        assert_eq!(retrieved, account);

        let resolved = storage.account_id_by_number(&account.number).unwrap();
        assert_eq!(resolved, Some(account.id));
    }

    #[test]
    fn test_duplicate_number_rejected() {
        let (storage, _temp) = test_storage();

        let first = test_account("ACC000000000001");
        storage.create_account(&first).unwrap();

        let second = test_account("ACC000000000001");
        let result = storage.create_account(&second);
        assert!(matches!(result, Err(Error::DuplicateAccountNumber(_))));

        // The original row is untouched
        let resolved = storage.account_id_by_number(&first.number).unwrap();
        assert_eq!(resolved, Some(first.id));
    }

    #[test]
    fn test_accounts_by_user() {
        let (storage, _temp) = test_storage();

        let user_id = UserId::generate();
        let mut expected = Vec::new();
        for i in 0..3 {
            let mut account = test_account(&format!("ACC00000000000{}", i));
            account.user_id = user_id;
            storage.create_account(&account).unwrap();
            expected.push(account.id);
        }
        // An unrelated user's account must not show up
        storage.create_account(&test_account("ACC999999999999")).unwrap();

        let mut ids = storage.account_ids_by_user(user_id).unwrap();
        ids.sort();
        expected.sort();
        assert_eq!(ids, expected);
    }

    #[test]
    fn test_put_account_pair_atomic() {
        let (storage, _temp) = test_storage();

        let mut from = test_account("ACC000000000001");
        let mut to = test_account("ACC000000000002");
        storage.create_account(&from).unwrap();
        storage.create_account(&to).unwrap();

        from.balance = Decimal::new(7000, 2);
        from.version += 1;
        to.balance = Decimal::new(8000, 2);
        to.version += 1;
        storage.put_account_pair(&from, &to).unwrap();

        assert_eq!(storage.get_account(from.id).unwrap().unwrap().balance, from.balance);
        assert_eq!(storage.get_account(to.id).unwrap().unwrap().version, 1);
    }

    #[test]
    fn test_append_and_get_transfer() {
        let (storage, _temp) = test_storage();

        let record = TransferRecord::pending(
            AccountId::generate(),
            AccountId::generate(),
            Decimal::new(3000, 2),
            "rent",
            "key-1",
        );
        storage.append_transfer(&record).unwrap();

        let retrieved = storage.get_transfer(record.id).unwrap().unwrap();
        assert_eq!(retrieved, record);

        let resolved = storage.transfer_id_by_idempotency_key("key-1").unwrap();
        assert_eq!(resolved, Some(record.id));
    }

    #[test]
    fn test_append_transfer_idempotent() {
        let (storage, _temp) = test_storage();

        let record = TransferRecord::pending(
            AccountId::generate(),
            AccountId::generate(),
            Decimal::new(3000, 2),
            "rent",
            "key-1",
        );
        storage.append_transfer(&record).unwrap();
        storage.append_transfer(&record).unwrap();

        let listed = storage.transfers_for_account(record.from_account, 10).unwrap();
        assert_eq!(listed.len(), 1);
    }

    #[test]
    fn test_transfers_for_account_recent_first() {
        let (storage, _temp) = test_storage();

        let account_id = AccountId::generate();
        let other = AccountId::generate();

        let mut records = Vec::new();
        for i in 0..3 {
            let mut record = TransferRecord::pending(
                account_id,
                other,
                Decimal::new(1000 + i, 2),
                "",
                format!("key-{}", i),
            );
            record.requested_at = chrono::Utc::now() + chrono::Duration::seconds(i);
            storage.append_transfer(&record).unwrap();
            records.push(record);
        }

        let listed = storage.transfers_for_account(account_id, 10).unwrap();
        assert_eq!(listed.len(), 3);
        assert_eq!(listed[0].id, records[2].id);
        assert_eq!(listed[2].id, records[0].id);

        // Limit is honored
        let limited = storage.transfers_for_account(account_id, 2).unwrap();
        assert_eq!(limited.len(), 2);
        assert_eq!(limited[0].id, records[2].id);
    }
}
