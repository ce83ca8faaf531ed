use anyhow::Context;

// Advisory locks are scoped to the Postgres session, so acquire and release must run on the same
// connection.
const LOCK_NAMESPACE: i64 = 0x4D41_474E_4946; // "MAGNIF"
const SWEEP_LOCK_KEY: i64 = LOCK_NAMESPACE ^ 0x5357_4550; // "SWEP"

pub async fn try_acquire_sweep_lock(conn: &mut sqlx::PgConnection) -> anyhow::Result<bool> {
    let acquired: (bool,) = sqlx::query_as("SELECT pg_try_advisory_lock($1)")
        .persistent(false)
        .bind(SWEEP_LOCK_KEY)
        .fetch_one(&mut *conn)
        .await
        .with_context(|| format!("failed to acquire advisory lock (key={SWEEP_LOCK_KEY})"))?;
    Ok(acquired.0)
}

pub async fn release_sweep_lock(conn: &mut sqlx::PgConnection) -> anyhow::Result<()> {
    sqlx::query("SELECT pg_advisory_unlock($1)")
        .persistent(false)
        .bind(SWEEP_LOCK_KEY)
        .execute(&mut *conn)
        .await
        .with_context(|| format!("failed to release advisory lock (key={SWEEP_LOCK_KEY})"))?;
    Ok(())
}
