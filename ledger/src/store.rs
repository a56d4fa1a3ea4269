//! SQLite-backed exchange store.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use flipex_common::{
    Asset, CheckId, ExchangeId, ExchangeRequest, ExchangeStatus, InvoiceId, UserId,
};
use rust_decimal::Decimal;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use tracing::{info, instrument};

use crate::error::{LedgerError, LedgerResult};

/// Optional profile details captured when a user first interacts.
#[derive(Debug, Clone, Default)]
pub struct UserProfile {
    pub username: Option<String>,
    pub full_name: Option<String>,
}

/// Aggregate counters for the observational health surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedgerStats {
    pub users: i64,
    pub total: i64,
    pub completed: i64,
    pub pending: i64,
}

/// Durable store for users and exchange requests.
#[derive(Clone)]
pub struct ExchangeStore {
    pool: SqlitePool,
}

impl ExchangeStore {
    /// Connect to the database, creating the file and schema if needed.
    pub async fn connect(url: &str) -> LedgerResult<Self> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(LedgerError::Database)?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.init_schema().await?;

        info!(url, "Exchange ledger initialized");
        Ok(store)
    }

    /// Connect to a fresh in-memory database.
    pub async fn in_memory() -> LedgerResult<Self> {
        Self::connect("sqlite::memory:").await
    }

    async fn init_schema(&self) -> LedgerResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                platform_id INTEGER UNIQUE NOT NULL,
                username TEXT,
                full_name TEXT,
                registered_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS exchanges (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                exchange_id TEXT UNIQUE NOT NULL,
                user_id INTEGER NOT NULL,
                asset TEXT NOT NULL,
                gross TEXT NOT NULL,
                rate TEXT NOT NULL,
                gross_usdt TEXT NOT NULL,
                commission_usdt TEXT NOT NULL,
                net_usdt TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending',
                invoice_id INTEGER,
                invoice_url TEXT,
                check_id INTEGER,
                check_url TEXT,
                created_at TIMESTAMP NOT NULL,
                settled_at TIMESTAMP,
                FOREIGN KEY (user_id) REFERENCES users (id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_users_platform_id ON users(platform_id)")
            .execute(&self.pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_exchanges_user_id ON exchanges(user_id)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Look up or register a user, returning the internal row id.
    #[instrument(skip(self, profile), fields(user = %user))]
    pub async fn get_or_create_user(
        &self,
        user: UserId,
        profile: &UserProfile,
    ) -> LedgerResult<i64> {
        let existing = sqlx::query("SELECT id FROM users WHERE platform_id = ?")
            .bind(user.as_i64())
            .fetch_optional(&self.pool)
            .await?;

        if let Some(row) = existing {
            return Ok(row.try_get("id")?);
        }

        let result = sqlx::query(
            "INSERT INTO users (platform_id, username, full_name) VALUES (?, ?, ?)",
        )
        .bind(user.as_i64())
        .bind(profile.username.as_deref())
        .bind(profile.full_name.as_deref())
        .execute(&self.pool)
        .await?;

        info!(user = %user, "User registered");
        Ok(result.last_insert_rowid())
    }

    /// Insert a new pending exchange request.
    #[instrument(skip(self, request), fields(exchange_id = %request.id))]
    pub async fn create_request(&self, request: &ExchangeRequest) -> LedgerResult<()> {
        let user_row = self
            .get_or_create_user(request.user, &UserProfile::default())
            .await?;

        sqlx::query(
            r#"
            INSERT INTO exchanges (
                exchange_id, user_id, asset, gross, rate,
                gross_usdt, commission_usdt, net_usdt, status,
                invoice_id, invoice_url, check_id, check_url,
                created_at, settled_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(request.id.to_string())
        .bind(user_row)
        .bind(request.asset.code())
        .bind(request.gross.to_string())
        .bind(request.rate.to_string())
        .bind(request.gross_usdt.to_string())
        .bind(request.commission_usdt.to_string())
        .bind(request.net_usdt.to_string())
        .bind(request.status.as_str())
        .bind(request.invoice_id.map(|i| i.as_i64()))
        .bind(request.invoice_url.as_deref())
        .bind(request.check_id.map(|c| c.as_i64()))
        .bind(request.check_url.as_deref())
        .bind(request.created_at)
        .bind(request.settled_at)
        .execute(&self.pool)
        .await?;

        info!(exchange_id = %request.id, "Exchange request recorded");
        Ok(())
    }

    /// Attach a gateway invoice to a pending request.
    pub async fn attach_invoice(
        &self,
        id: ExchangeId,
        invoice_id: InvoiceId,
        invoice_url: &str,
    ) -> LedgerResult<()> {
        sqlx::query("UPDATE exchanges SET invoice_id = ?, invoice_url = ? WHERE exchange_id = ?")
            .bind(invoice_id.as_i64())
            .bind(invoice_url)
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Mark a request completed with its payout check.
    #[instrument(skip(self, check_url), fields(exchange_id = %id))]
    pub async fn complete_request(
        &self,
        id: ExchangeId,
        check_id: CheckId,
        check_url: &str,
        settled_at: DateTime<Utc>,
    ) -> LedgerResult<()> {
        sqlx::query(
            r#"
            UPDATE exchanges
            SET status = ?, check_id = ?, check_url = ?, settled_at = ?
            WHERE exchange_id = ?
            "#,
        )
        .bind(ExchangeStatus::Completed.as_str())
        .bind(check_id.as_i64())
        .bind(check_url)
        .bind(settled_at)
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        info!(exchange_id = %id, "Exchange request completed");
        Ok(())
    }

    /// Fetch a request by its exchange id.
    pub async fn get_request(&self, id: ExchangeId) -> LedgerResult<Option<ExchangeRequest>> {
        let row = sqlx::query(
            r#"
            SELECT e.*, u.platform_id
            FROM exchanges e
            JOIN users u ON u.id = e.user_id
            WHERE e.exchange_id = ?
            "#,
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(decode_request).transpose()
    }

    /// Fetch the most recent request for a user, if any.
    pub async fn get_latest_request(&self, user: UserId) -> LedgerResult<Option<ExchangeRequest>> {
        let row = sqlx::query(
            r#"
            SELECT e.*, u.platform_id
            FROM exchanges e
            JOIN users u ON u.id = e.user_id
            WHERE u.platform_id = ?
            ORDER BY e.id DESC
            LIMIT 1
            "#,
        )
        .bind(user.as_i64())
        .fetch_optional(&self.pool)
        .await?;

        row.map(decode_request).transpose()
    }

    /// Aggregate counters for the health surface.
    pub async fn aggregate_counts(&self) -> LedgerResult<LedgerStats> {
        let row = sqlx::query(
            r#"
            SELECT
                (SELECT COUNT(*) FROM users) AS users,
                COUNT(*) AS total,
                COALESCE(SUM(CASE WHEN status = 'completed' THEN 1 ELSE 0 END), 0) AS completed,
                COALESCE(SUM(CASE WHEN status = 'pending' THEN 1 ELSE 0 END), 0) AS pending
            FROM exchanges
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(LedgerStats {
            users: row.try_get("users")?,
            total: row.try_get("total")?,
            completed: row.try_get("completed")?,
            pending: row.try_get("pending")?,
        })
    }
}

fn decode_request(row: SqliteRow) -> LedgerResult<ExchangeRequest> {
    let id_text: String = row.try_get("exchange_id")?;
    let id = ExchangeId::parse(&id_text)
        .map_err(|e| LedgerError::Corrupt(format!("exchange_id {id_text}: {e}")))?;

    let asset_code: String = row.try_get("asset")?;
    let asset = Asset::from_code(&asset_code)
        .ok_or(LedgerError::Corrupt(format!("unknown asset {asset_code}")))?;

    let status_text: String = row.try_get("status")?;
    let status = ExchangeStatus::parse(&status_text)
        .ok_or(LedgerError::Corrupt(format!("unknown status {status_text}")))?;

    Ok(ExchangeRequest {
        id,
        user: UserId::new(row.try_get("platform_id")?),
        asset,
        gross: decode_decimal(&row, "gross")?,
        rate: decode_decimal(&row, "rate")?,
        gross_usdt: decode_decimal(&row, "gross_usdt")?,
        commission_usdt: decode_decimal(&row, "commission_usdt")?,
        net_usdt: decode_decimal(&row, "net_usdt")?,
        status,
        invoice_id: row
            .try_get::<Option<i64>, _>("invoice_id")?
            .map(InvoiceId::new),
        invoice_url: row.try_get("invoice_url")?,
        check_id: row.try_get::<Option<i64>, _>("check_id")?.map(CheckId::new),
        check_url: row.try_get("check_url")?,
        created_at: row.try_get("created_at")?,
        settled_at: row.try_get("settled_at")?,
    })
}

fn decode_decimal(row: &SqliteRow, column: &str) -> LedgerResult<Decimal> {
    let text: String = row.try_get(column)?;
    text.parse()
        .map_err(|e| LedgerError::Corrupt(format!("{column} '{text}': {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn test_request(user: UserId) -> ExchangeRequest {
        ExchangeRequest::new(
            user,
            Asset::Ton,
            dec!(0.5),
            dec!(2.0),
            dec!(1.0),
            dec!(0.05),
            dec!(0.95),
        )
    }

    #[tokio::test]
    async fn test_get_or_create_user_is_idempotent() {
        let store = ExchangeStore::in_memory().await.unwrap();
        let profile = UserProfile {
            username: Some("alice".to_string()),
            full_name: Some("Alice".to_string()),
        };

        let id1 = store
            .get_or_create_user(UserId::new(42), &profile)
            .await
            .unwrap();
        let id2 = store
            .get_or_create_user(UserId::new(42), &UserProfile::default())
            .await
            .unwrap();

        assert_eq!(id1, id2);
    }

    #[tokio::test]
    async fn test_request_roundtrip() {
        let store = ExchangeStore::in_memory().await.unwrap();
        let request = test_request(UserId::new(42));

        store.create_request(&request).await.unwrap();
        let loaded = store.get_request(request.id).await.unwrap().unwrap();

        assert_eq!(loaded.id, request.id);
        assert_eq!(loaded.user, UserId::new(42));
        assert_eq!(loaded.asset, Asset::Ton);
        assert_eq!(loaded.gross, dec!(0.5));
        assert_eq!(loaded.net_usdt, dec!(0.95));
        assert_eq!(loaded.status, ExchangeStatus::Pending);
        assert!(loaded.invoice_id.is_none());
    }

    #[tokio::test]
    async fn test_attach_invoice() {
        let store = ExchangeStore::in_memory().await.unwrap();
        let request = test_request(UserId::new(42));
        store.create_request(&request).await.unwrap();

        store
            .attach_invoice(request.id, InvoiceId::new(77), "https://pay.example/77")
            .await
            .unwrap();

        let loaded = store.get_request(request.id).await.unwrap().unwrap();
        assert_eq!(loaded.invoice_id, Some(InvoiceId::new(77)));
        assert_eq!(loaded.invoice_url.as_deref(), Some("https://pay.example/77"));
    }

    #[tokio::test]
    async fn test_complete_request() {
        let store = ExchangeStore::in_memory().await.unwrap();
        let request = test_request(UserId::new(42));
        store.create_request(&request).await.unwrap();

        store
            .complete_request(
                request.id,
                CheckId::new(99),
                "https://redeem.example/99",
                Utc::now(),
            )
            .await
            .unwrap();

        let loaded = store.get_request(request.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, ExchangeStatus::Completed);
        assert_eq!(loaded.check_id, Some(CheckId::new(99)));
        assert!(loaded.settled_at.is_some());
        assert!(loaded.is_settled());
    }

    #[tokio::test]
    async fn test_latest_request_ordering() {
        let store = ExchangeStore::in_memory().await.unwrap();
        let user = UserId::new(42);

        let first = test_request(user);
        let second = test_request(user);
        store.create_request(&first).await.unwrap();
        store.create_request(&second).await.unwrap();

        let latest = store.get_latest_request(user).await.unwrap().unwrap();
        assert_eq!(latest.id, second.id);
    }

    #[tokio::test]
    async fn test_latest_request_for_unknown_user() {
        let store = ExchangeStore::in_memory().await.unwrap();
        assert!(store
            .get_latest_request(UserId::new(7))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_aggregate_counts() {
        let store = ExchangeStore::in_memory().await.unwrap();

        let empty = store.aggregate_counts().await.unwrap();
        assert_eq!(empty.total, 0);
        assert_eq!(empty.users, 0);

        let request = test_request(UserId::new(42));
        store.create_request(&request).await.unwrap();

        let done = test_request(UserId::new(43));
        store.create_request(&done).await.unwrap();
        store
            .complete_request(done.id, CheckId::new(1), "https://r", Utc::now())
            .await
            .unwrap();

        let stats = store.aggregate_counts().await.unwrap();
        assert_eq!(stats.users, 2);
        assert_eq!(stats.total, 2);
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.pending, 1);
    }
}
