use async_trait::async_trait;
use mt5bot_core::{
    OrderFilling, OrderJournal, OrderRecord, OrderTime, OrderType, ReturnCode, StoreError,
    TradeAction,
};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use tracing::{debug, info};

/// Open a connection pool.
pub async fn connect(url: &str) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new().max_connections(5).connect(url).await
}

/// Run embedded migrations.
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("../../migrations").run(pool).await?;
    Ok(())
}

/// Upsert return codes into `mt5_return_codes`.
pub async fn seed_return_codes(pool: &PgPool, codes: &[ReturnCode]) -> Result<u64, sqlx::Error> {
    let mut count = 0u64;
    for code in codes {
        sqlx::query(
            "INSERT INTO mt5_return_codes (id, constant, description)
             VALUES ($1, $2, $3)
             ON CONFLICT (id) DO UPDATE
             SET constant = EXCLUDED.constant, description = EXCLUDED.description",
        )
        .bind(code.id as i32)
        .bind(&code.constant)
        .bind(&code.description)
        .execute(pool)
        .await?;
        count += 1;
    }
    Ok(count)
}

/// Append one executed order to `order_history`.
pub async fn insert_order(pool: &PgPool, record: &OrderRecord) -> Result<(), sqlx::Error> {
    let order_id = to_bigint("order_id", record.order_id)?;
    let deal_id = to_bigint("deal_id", record.deal_id)?;
    let magic = to_bigint("magic", record.magic)?;
    sqlx::query(
        "INSERT INTO order_history (
            order_id, deal_id, timestamp, retcode, symbol,
            price, bid, ask, volume, action, order_type,
            sl, tp, deviation, magic, comment, type_time, type_filling
        ) VALUES (
            $1, $2, $3, $4, $5, $6, $7, $8, $9,
            $10, $11, $12, $13, $14, $15, $16, $17, $18
        )",
    )
    .bind(order_id)
    .bind(deal_id)
    .bind(record.timestamp)
    .bind(record.retcode as i32)
    .bind(&record.symbol)
    .bind(record.price)
    .bind(record.bid)
    .bind(record.ask)
    .bind(record.volume)
    .bind(record.action.code())
    .bind(record.order_type.code())
    .bind(record.sl)
    .bind(record.tp)
    .bind(record.deviation as i32)
    .bind(magic)
    .bind(&record.comment)
    .bind(record.type_time.code())
    .bind(record.type_filling.code())
    .execute(pool)
    .await?;
    Ok(())
}

/// Look up one return code by id.
pub async fn return_code(pool: &PgPool, id: u32) -> Result<Option<ReturnCode>, sqlx::Error> {
    let row = sqlx::query("SELECT id, constant, description FROM mt5_return_codes WHERE id = $1")
        .bind(id as i32)
        .fetch_optional(pool)
        .await?;

    Ok(row.map(|r| ReturnCode {
        id: r.get::<i32, _>("id") as u32,
        constant: r.get("constant"),
        description: r.get("description"),
    }))
}

/// Most recent orders first.
pub async fn recent_orders(pool: &PgPool, limit: i64) -> Result<Vec<OrderRecord>, sqlx::Error> {
    let rows = sqlx::query(
        "SELECT order_id, deal_id, timestamp, retcode, symbol,
                price, bid, ask, volume, action, order_type,
                sl, tp, deviation, magic, comment, type_time, type_filling
         FROM order_history
         ORDER BY timestamp DESC, id DESC
         LIMIT $1",
    )
    .bind(limit)
    .fetch_all(pool)
    .await?;

    rows.iter().map(order_from_row).collect()
}

fn order_from_row(r: &PgRow) -> Result<OrderRecord, sqlx::Error> {
    Ok(OrderRecord {
        order_id: from_bigint("order_id", r.try_get("order_id")?)?,
        deal_id: from_bigint("deal_id", r.try_get("deal_id")?)?,
        timestamp: r.try_get("timestamp")?,
        retcode: r.try_get::<i32, _>("retcode")? as u32,
        symbol: r.try_get("symbol")?,
        price: r.try_get("price")?,
        bid: r.try_get("bid")?,
        ask: r.try_get("ask")?,
        volume: r.try_get("volume")?,
        action: decode_code(r, "action", TradeAction::from_code)?,
        order_type: decode_code(r, "order_type", OrderType::from_code)?,
        sl: r.try_get("sl")?,
        tp: r.try_get("tp")?,
        deviation: r.try_get::<i32, _>("deviation")? as u32,
        magic: from_bigint("magic", r.try_get("magic")?)?,
        comment: r.try_get("comment")?,
        type_time: decode_code(r, "type_time", OrderTime::from_code)?,
        type_filling: decode_code(r, "type_filling", OrderFilling::from_code)?,
    })
}

/// Tickets and magic numbers are unsigned but stored as BIGINT; values
/// past `i64::MAX` are refused rather than wrapped.
fn to_bigint(column: &str, value: u64) -> Result<i64, sqlx::Error> {
    i64::try_from(value)
        .map_err(|_| sqlx::Error::Encode(format!("{} {} exceeds BIGINT", column, value).into()))
}

fn from_bigint(column: &str, value: i64) -> Result<u64, sqlx::Error> {
    u64::try_from(value)
        .map_err(|_| sqlx::Error::Decode(format!("negative {} {}", column, value).into()))
}

fn decode_code<T>(
    row: &PgRow,
    column: &str,
    from_code: fn(i32) -> Option<T>,
) -> Result<T, sqlx::Error> {
    let code: i32 = row.try_get(column)?;
    from_code(code).ok_or_else(|| {
        sqlx::Error::Decode(format!("unknown {} code {}", column, code).into())
    })
}

/// Order journal backed by PostgreSQL.
#[derive(Clone)]
pub struct PgOrderJournal {
    pool: PgPool,
}

impl PgOrderJournal {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect, migrate and seed the return code table.
    pub async fn open(url: &str) -> Result<Self, StoreError> {
        let pool = connect(url).await.map_err(db_err)?;
        run_migrations(&pool)
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;
        let seeded = seed_return_codes(&pool, &ReturnCode::builtin_table())
            .await
            .map_err(db_err)?;
        info!(seeded, "Order journal ready");
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn recent_orders(&self, limit: i64) -> Result<Vec<OrderRecord>, StoreError> {
        recent_orders(&self.pool, limit).await.map_err(db_err)
    }
}

fn db_err(e: sqlx::Error) -> StoreError {
    StoreError::Database(e.to_string())
}

#[async_trait]
impl OrderJournal for PgOrderJournal {
    async fn save_order(&self, record: &OrderRecord) -> Result<(), StoreError> {
        insert_order(&self.pool, record).await.map_err(db_err)?;
        debug!(order = record.order_id, symbol = %record.symbol, "Order saved");
        Ok(())
    }

    async fn return_code(&self, id: u32) -> Result<Option<ReturnCode>, StoreError> {
        return_code(&self.pool, id).await.map_err(db_err)
    }
}
