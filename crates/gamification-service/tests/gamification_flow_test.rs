//! 打卡、账本、连续打卡、成就与奖励领取的集成测试
//!
//! 并发语义依赖 PostgreSQL 的 advisory lock 与条件更新，无法通过 mock 覆盖。
//! 每个测试使用独立的用户与健身房，可以在同一个库上重复运行。
//!
//! ## 运行方式
//!
//! ```bash
//! DATABASE_URL=postgres://... cargo test -p gamification-service --test gamification_flow_test -- --ignored
//! ```

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use fitquest_shared::cache::{Cache, CacheKey};
use fitquest_shared::config::RedisConfig;
use futures::future::join_all;
use gamification::events::LogEventPublisher;
use gamification::repository::PgDirectory;
use gamification::service::{AdjustCommand, CheckInCommand, CheckInOutcome, ClaimCommand};
use gamification::state::AppState;
use gamification::{
    AchievementTrigger, ClaimStatus, GamificationError, GamificationSettings, LedgerReason,
};
use serde_json::json;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use uuid::Uuid;

// ==================== 辅助函数 ====================

const GYM_LAT: f64 = 4.6533;
const GYM_LNG: f64 = -74.0836;

fn database_url() -> String {
    std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for integration tests")
}

async fn setup() -> (PgPool, AppState) {
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&database_url())
        .await
        .expect("连接数据库失败");
    sqlx::migrate!("../../migrations")
        .run(&pool)
        .await
        .expect("执行迁移失败");

    let redis_url =
        std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string());
    let cache = Arc::new(
        Cache::new(&RedisConfig {
            url: redis_url,
            pool_size: 2,
        })
        .expect("创建 Redis 客户端失败"),
    );

    let directory = Arc::new(PgDirectory::new(pool.clone()));
    let state = AppState::new(
        pool.clone(),
        cache,
        GamificationSettings::default(),
        Arc::new(LogEventPublisher),
        directory.clone(),
        directory,
    );
    (pool, state)
}

fn unique_user(prefix: &str) -> String {
    format!("it-{prefix}-{}", Uuid::new_v4().simple())
}

/// 插入一家健身房并为用户开通订阅
async fn seed_gym_for(pool: &PgPool, user_id: &str) -> i64 {
    let gym_id = 1_000_000 + (Uuid::new_v4().as_u128() % 1_000_000_000) as i64;
    sqlx::query(
        r#"
        INSERT INTO gyms (id, name, latitude, longitude, geofence_radius_meters, is_active)
        VALUES ($1, 'IntegTest Gym', $2, $3, 150, TRUE)
        "#,
    )
    .bind(gym_id)
    .bind(GYM_LAT)
    .bind(GYM_LNG)
    .execute(pool)
    .await
    .expect("插入测试健身房失败");

    sqlx::query(
        r#"
        INSERT INTO gym_subscriptions (user_id, gym_id, valid_from, valid_until)
        VALUES ($1, $2, '2000-01-01T00:00:00Z', NULL)
        "#,
    )
    .bind(user_id)
    .bind(gym_id)
    .execute(pool)
    .await
    .expect("插入测试订阅失败");

    gym_id
}

/// 插入一个奖励定义
async fn seed_reward(
    pool: &PgPool,
    reward_type: &str,
    effect: serde_json::Value,
    token_cost: i64,
    stock: Option<i32>,
    is_stackable: bool,
    max_stack: i32,
) -> i64 {
    sqlx::query_scalar(
        r#"
        INSERT INTO reward_definitions (name, reward_type, effect, token_cost, is_unlimited,
                                        is_stackable, max_stack, stock, is_active)
        VALUES ('IntegTest Reward', $1, $2, $3, $4, $5, $6, $7, TRUE)
        RETURNING id
        "#,
    )
    .bind(reward_type)
    .bind(effect)
    .bind(token_cost)
    .bind(stock.is_none())
    .bind(is_stackable)
    .bind(max_stack)
    .bind(stock)
    .fetch_one(pool)
    .await
    .expect("插入测试奖励失败")
}

fn check_in_cmd(user_id: &str, gym_id: i64) -> CheckInCommand {
    CheckInCommand {
        user_id: user_id.to_string(),
        gym_id: Some(gym_id),
        latitude: Some(GYM_LAT + 0.0002),
        longitude: Some(GYM_LNG),
        accuracy: Some(10.0),
    }
}

async fn check_in_on(
    state: &AppState,
    user_id: &str,
    gym_id: i64,
    at: DateTime<Utc>,
) -> CheckInOutcome {
    state
        .attendance
        .check_in(check_in_cmd(user_id, gym_id), at)
        .await
        .expect("打卡失败")
}

async fn grant_tokens(state: &AppState, user_id: &str, amount: i64) {
    state
        .ledger
        .adjust(AdjustCommand {
            user_id: user_id.to_string(),
            delta: amount,
            reason: LedgerReason::AdminAdjustment,
            note: Some("integration test".to_string()),
            operator_id: "it-operator".to_string(),
        })
        .await
        .expect("发放测试代币失败");
}

async fn count_ledger(pool: &PgPool, user_id: &str, reason: &str) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM token_ledger WHERE user_id = $1 AND reason = $2")
        .bind(user_id)
        .bind(reason)
        .fetch_one(pool)
        .await
        .expect("查询流水失败")
}

/// 以 `days_ago` 天前的同一时刻为基准
fn days_ago(days: i64) -> DateTime<Utc> {
    Utc::now() - Duration::days(days)
}

// ==================== 打卡 ====================

#[tokio::test]
#[ignore = "需要 PostgreSQL 数据库连接"]
async fn test_concurrent_same_day_check_in_records_once() {
    let (pool, state) = setup().await;
    let user = unique_user("same-day");
    let gym_id = seed_gym_for(&pool, &user).await;
    let now = Utc::now();

    let outcomes: Vec<CheckInOutcome> = join_all(
        (0..4).map(|_| state.attendance.check_in(check_in_cmd(&user, gym_id), now)),
    )
    .await
    .into_iter()
    .collect::<Result<_, _>>()
    .expect("并发打卡失败");

    assert_eq!(outcomes.iter().filter(|o| !o.already_checked_in).count(), 1);
    assert!(outcomes.iter().all(|o| o.attendance.id == outcomes[0].attendance.id));

    let attendances: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM attendances WHERE user_id = $1")
        .bind(&user)
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(attendances, 1);
    assert_eq!(count_ledger(&pool, &user, "ATTENDANCE_REWARD").await, 1);
}

#[tokio::test]
#[ignore = "需要 PostgreSQL 数据库连接"]
async fn test_out_of_range_wins_over_accuracy() {
    let (pool, state) = setup().await;
    let user = unique_user("far");
    let gym_id = seed_gym_for(&pool, &user).await;

    let cmd = CheckInCommand {
        latitude: Some(GYM_LAT + 0.05),
        accuracy: Some(500.0),
        ..check_in_cmd(&user, gym_id)
    };
    let err = state.attendance.check_in(cmd, Utc::now()).await.unwrap_err();
    assert_eq!(err.error_code(), "OUT_OF_RANGE");

    let attendances: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM attendances WHERE user_id = $1")
        .bind(&user)
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(attendances, 0);
}

#[tokio::test]
#[ignore = "需要 PostgreSQL 数据库连接"]
async fn test_check_in_without_subscription_is_rejected() {
    let (pool, state) = setup().await;
    let owner = unique_user("owner");
    let gym_id = seed_gym_for(&pool, &owner).await;
    let stranger = unique_user("stranger");

    let err = state
        .attendance
        .check_in(check_in_cmd(&stranger, gym_id), Utc::now())
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), "SUBSCRIPTION_REQUIRED");
}

#[tokio::test]
#[ignore = "需要 PostgreSQL 数据库连接"]
async fn test_check_out_closes_today() {
    let (pool, state) = setup().await;
    let user = unique_user("checkout");
    let gym_id = seed_gym_for(&pool, &user).await;
    let entered = Utc::now() - Duration::minutes(90);

    check_in_on(&state, &user, gym_id, entered).await;
    let closed = state.attendance.check_out(&user, Utc::now()).await.unwrap();
    assert!(closed.exited_at.is_some());
    assert!(closed.duration_minutes.unwrap_or_default() >= 89);

    let err = state.attendance.check_out(&user, Utc::now()).await.unwrap_err();
    assert!(matches!(err, GamificationError::NoOpenAttendance));
}

// ==================== 代币账本 ====================

#[tokio::test]
#[ignore = "需要 PostgreSQL 数据库连接"]
async fn test_ledger_chain_matches_balance() {
    let (_pool, state) = setup().await;
    let user = unique_user("chain");

    grant_tokens(&state, &user, 120).await;
    grant_tokens(&state, &user, 30).await;
    let debit = state
        .ledger
        .adjust(AdjustCommand {
            user_id: user.clone(),
            delta: -50,
            reason: LedgerReason::AdminAdjustment,
            note: None,
            operator_id: "it-operator".to_string(),
        })
        .await
        .unwrap();
    assert_eq!(debit.seq, 3);
    assert_eq!(debit.balance_after, 100);

    let verification = state.ledger.verified_balance(&user).await.unwrap();
    assert_eq!(verification.balance, 100);
    assert_eq!(verification.entry_count, 3);

    let stats = state.ledger.stats(&user).await.unwrap();
    assert_eq!(stats.total_earned, 150);
    assert_eq!(stats.total_spent, 50);
}

#[tokio::test]
#[ignore = "需要 PostgreSQL 数据库连接"]
async fn test_overdraft_is_rejected() {
    let (_pool, state) = setup().await;
    let user = unique_user("overdraft");
    grant_tokens(&state, &user, 10).await;

    let err = state
        .ledger
        .adjust(AdjustCommand {
            user_id: user.clone(),
            delta: -11,
            reason: LedgerReason::AdminAdjustment,
            note: None,
            operator_id: "it-operator".to_string(),
        })
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), "INSUFFICIENT_BALANCE");
    assert_eq!(state.ledger.balance_of(&user).await.unwrap(), 10);
}

// ==================== 连续打卡 ====================

#[tokio::test]
#[ignore = "需要 PostgreSQL 数据库连接"]
async fn test_missed_day_without_saver_resets() {
    let (pool, state) = setup().await;
    let user = unique_user("reset");
    let gym_id = seed_gym_for(&pool, &user).await;

    for day in (3..=7).rev() {
        check_in_on(&state, &user, gym_id, days_ago(day)).await;
    }
    // 跳过 days_ago(2)
    let outcome = check_in_on(&state, &user, gym_id, days_ago(1)).await;

    assert_eq!(outcome.streak.value, 1);
    assert_eq!(outcome.streak.last_value, 5);
}

#[tokio::test]
#[ignore = "需要 PostgreSQL 数据库连接"]
async fn test_streak_saver_bridges_missed_day() {
    let (pool, state) = setup().await;
    let user = unique_user("saver");
    let gym_id = seed_gym_for(&pool, &user).await;
    let saver = seed_reward(&pool, "STREAK_SAVER", json!({"type": "STREAK_SAVER"}), 20, None, true, 3).await;

    for day in (4..=9).rev() {
        check_in_on(&state, &user, gym_id, days_ago(day)).await;
    }
    grant_tokens(&state, &user, 20).await;
    let claim = state
        .rewards
        .claim(
            ClaimCommand {
                user_id: user.clone(),
                reward_id: saver,
                code: None,
            },
            Utc::now(),
        )
        .await
        .unwrap();
    assert_eq!(claim.claimed_reward.status, ClaimStatus::Active);
    assert_eq!(state.streaks.get(&user).await.unwrap().recovery_items, 1);

    // 跳过 days_ago(3)
    let outcome = check_in_on(&state, &user, gym_id, days_ago(2)).await;
    assert_eq!(outcome.streak.value, 7);
    assert_eq!(outcome.streak.recovery_items, 0);

    let claims = state
        .rewards
        .list_claimed(&user, Some(ClaimStatus::Used))
        .await
        .unwrap();
    assert_eq!(claims.len(), 1);
    assert_eq!(claims[0].id, claim.claimed_reward.id);
}

// ==================== 成就 ====================

#[tokio::test]
#[ignore = "需要 PostgreSQL 数据库连接"]
async fn test_achievement_unlocks_exactly_once() {
    let (pool, state) = setup().await;
    sqlx::query(
        r#"
        INSERT INTO achievement_definitions (code, name, category, metric_type, target_value,
                                             token_reward, is_active, sort_order)
        VALUES ('IT_VISITS_10', 'IntegTest 10 visits', 'ATTENDANCE', 'ATTENDANCE_COUNT', 10, 25, TRUE, 0)
        ON CONFLICT (code) DO UPDATE SET target_value = 10, token_reward = 25, is_active = TRUE
        "#,
    )
    .execute(&pool)
    .await
    .unwrap();

    let user = unique_user("visits");
    let gym_id = seed_gym_for(&pool, &user).await;

    for day in (11..=19).rev() {
        let outcome = check_in_on(&state, &user, gym_id, days_ago(day)).await;
        assert!(outcome.unlocked_achievements.iter().all(|a| a.code != "IT_VISITS_10"));
    }

    let tenth = check_in_on(&state, &user, gym_id, days_ago(10)).await;
    let unlocked = tenth
        .unlocked_achievements
        .iter()
        .find(|a| a.code == "IT_VISITS_10")
        .expect("第 10 次打卡应解锁");
    assert_eq!(unlocked.token_reward, 25);

    check_in_on(&state, &user, gym_id, days_ago(9)).await;
    let again = state
        .achievements
        .reevaluate(&user, AchievementTrigger::Full)
        .await
        .unwrap();
    assert!(again.iter().all(|a| a.code != "IT_VISITS_10"));

    let credits: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM token_ledger WHERE user_id = $1 AND reason = 'ACHIEVEMENT_UNLOCKED' AND ref_id = 'IT_VISITS_10'",
    )
    .bind(&user)
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(credits, 1);
}

// ==================== 奖励领取 ====================

#[tokio::test]
#[ignore = "需要 PostgreSQL 数据库连接"]
async fn test_claim_debits_exact_cost() {
    let (pool, state) = setup().await;
    let user = unique_user("claim");
    let reward = seed_reward(&pool, "DISCOUNT", json!({"type": "DISCOUNT", "percent": 20}), 75, None, false, 1).await;
    grant_tokens(&state, &user, 100).await;

    let outcome = state
        .rewards
        .claim(
            ClaimCommand {
                user_id: user.clone(),
                reward_id: reward,
                code: None,
            },
            Utc::now(),
        )
        .await
        .unwrap();

    assert_eq!(outcome.balance, 25);
    assert_eq!(outcome.claimed_reward.status, ClaimStatus::Active);
    assert!(outcome.claimed_reward.expires_at.is_some());

    let (delta, balance_after, ref_id): (i64, i64, Option<String>) = sqlx::query_as(
        "SELECT delta, balance_after, ref_id FROM token_ledger WHERE user_id = $1 AND reason = 'REWARD_CLAIMED'",
    )
    .bind(&user)
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(delta, -75);
    assert_eq!(balance_after, 25);
    assert_eq!(ref_id, Some(outcome.claimed_reward.id.to_string()));
}

#[tokio::test]
#[ignore = "需要 PostgreSQL 数据库连接"]
async fn test_insufficient_tokens_leaves_no_trace() {
    let (pool, state) = setup().await;
    let user = unique_user("poor");
    let reward = seed_reward(&pool, "FREE_PASS", json!({"type": "FREE_PASS", "days": 3}), 75, Some(5), false, 1).await;
    grant_tokens(&state, &user, 50).await;

    let err = state
        .rewards
        .claim(
            ClaimCommand {
                user_id: user.clone(),
                reward_id: reward,
                code: None,
            },
            Utc::now(),
        )
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), "INSUFFICIENT_TOKENS");

    let stock: Option<i32> = sqlx::query_scalar("SELECT stock FROM reward_definitions WHERE id = $1")
        .bind(reward)
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(stock, Some(5));
    assert_eq!(state.ledger.balance_of(&user).await.unwrap(), 50);
}

#[tokio::test]
#[ignore = "需要 PostgreSQL 数据库连接"]
async fn test_last_unit_goes_to_one_claimer() {
    let (pool, state) = setup().await;
    let reward = seed_reward(&pool, "PRODUCT", json!({"type": "PRODUCT", "sku": "TOWEL-01"}), 30, Some(1), false, 1).await;
    let alice = unique_user("alice");
    let bob = unique_user("bob");
    grant_tokens(&state, &alice, 100).await;
    grant_tokens(&state, &bob, 100).await;

    let claim = |user: String| {
        let state = state.clone();
        async move {
            state
                .rewards
                .claim(
                    ClaimCommand {
                        user_id: user,
                        reward_id: reward,
                        code: None,
                    },
                    Utc::now(),
                )
                .await
        }
    };
    let (a, b) = tokio::join!(claim(alice.clone()), claim(bob.clone()));

    let results = [a, b];
    let successes = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(successes, 1);
    let failure = results.iter().find_map(|r| r.as_ref().err()).unwrap();
    assert_eq!(failure.error_code(), "OUT_OF_STOCK");

    let spent = state.ledger.balance_of(&alice).await.unwrap() + state.ledger.balance_of(&bob).await.unwrap();
    assert_eq!(spent, 170);
}

#[tokio::test]
#[ignore = "需要 PostgreSQL 数据库连接"]
async fn test_retry_with_same_code_debits_once() {
    let (pool, state) = setup().await;
    let user = unique_user("retry");
    let reward = seed_reward(&pool, "DISCOUNT", json!({"type": "DISCOUNT", "percent": 10}), 40, None, false, 1).await;
    grant_tokens(&state, &user, 100).await;

    let cmd = ClaimCommand {
        user_id: user.clone(),
        reward_id: reward,
        code: Some("retry-1".to_string()),
    };
    let first = state.rewards.claim(cmd.clone(), Utc::now()).await.unwrap();
    let second = state.rewards.claim(cmd, Utc::now()).await.unwrap();

    assert!(!first.already_claimed);
    assert!(second.already_claimed);
    assert_eq!(first.claimed_reward.id, second.claimed_reward.id);
    assert_eq!(second.balance, 60);
    assert_eq!(count_ledger(&pool, &user, "REWARD_CLAIMED").await, 1);
}

#[tokio::test]
#[ignore = "需要 PostgreSQL 数据库连接"]
async fn test_product_lifecycle() {
    let (pool, state) = setup().await;
    let user = unique_user("product");
    let reward = seed_reward(&pool, "PRODUCT", json!({"type": "PRODUCT", "sku": "BOTTLE-02"}), 30, None, false, 1).await;
    grant_tokens(&state, &user, 30).await;

    let claimed = state
        .rewards
        .claim(
            ClaimCommand {
                user_id: user.clone(),
                reward_id: reward,
                code: None,
            },
            Utc::now(),
        )
        .await
        .unwrap()
        .claimed_reward;
    assert_eq!(claimed.status, ClaimStatus::Pending);

    let err = state.rewards.mark_used(&user, claimed.id, Utc::now()).await.unwrap_err();
    assert_eq!(err.error_code(), "INVALID_TRANSITION");

    let active = state.rewards.activate(&user, claimed.id, Utc::now()).await.unwrap();
    assert_eq!(active.status, ClaimStatus::Active);
    assert!(active.activated_at.is_some());

    let used = state.rewards.mark_used(&user, claimed.id, Utc::now()).await.unwrap();
    assert_eq!(used.status, ClaimStatus::Used);
    assert!(used.used_at.is_some());

    let err = state.rewards.mark_used(&user, claimed.id, Utc::now()).await.unwrap_err();
    assert_eq!(err.error_code(), "INVALID_TRANSITION");

    // 他人的领取记录不可见
    let err = state.rewards.activate("someone-else", claimed.id, Utc::now()).await.unwrap_err();
    assert_eq!(err.error_code(), "CLAIMED_REWARD_NOT_FOUND");
}

#[tokio::test]
#[ignore = "需要 PostgreSQL 数据库连接"]
async fn test_expire_sweep_flips_due_claims() {
    let (pool, state) = setup().await;
    let user = unique_user("expire");
    let reward = seed_reward(
        &pool,
        "DISCOUNT",
        json!({"type": "DISCOUNT", "percent": 15, "validityDays": 1}),
        10,
        None,
        false,
        1,
    )
    .await;
    grant_tokens(&state, &user, 10).await;

    let claimed = state
        .rewards
        .claim(
            ClaimCommand {
                user_id: user.clone(),
                reward_id: reward,
                code: None,
            },
            days_ago(3),
        )
        .await
        .unwrap()
        .claimed_reward;
    assert!(claimed.is_expired(Utc::now()));

    while state.rewards.expire_due(Utc::now(), 500).await.unwrap() == 500 {}

    let expired = state
        .rewards
        .list_claimed(&user, Some(ClaimStatus::Expired))
        .await
        .unwrap();
    assert_eq!(expired.len(), 1);
    assert_eq!(expired[0].id, claimed.id);
}

fn claim_cmd(user_id: &str, reward_id: i64) -> ClaimCommand {
    ClaimCommand {
        user_id: user_id.to_string(),
        reward_id,
        code: None,
    }
}

async fn inventory_quantity(pool: &PgPool, user_id: &str, reward_id: i64) -> i32 {
    sqlx::query_scalar::<_, i32>(
        "SELECT quantity FROM reward_inventory WHERE user_id = $1 AND reward_id = $2",
    )
    .bind(user_id)
    .bind(reward_id)
    .fetch_optional(pool)
    .await
    .expect("查询库存失败")
    .unwrap_or(0)
}

#[tokio::test]
#[ignore = "需要 PostgreSQL 数据库连接"]
async fn test_claim_within_cooldown_is_rejected() {
    let (pool, state) = setup().await;
    let user = unique_user("cooldown");
    let reward = seed_reward(&pool, "DISCOUNT", json!({"type": "DISCOUNT", "percent": 5}), 10, None, false, 1).await;
    sqlx::query("UPDATE reward_definitions SET cooldown_days = 7 WHERE id = $1")
        .bind(reward)
        .execute(&pool)
        .await
        .unwrap();
    grant_tokens(&state, &user, 100).await;

    state.rewards.claim(claim_cmd(&user, reward), days_ago(3)).await.unwrap();
    let err = state.rewards.claim(claim_cmd(&user, reward), Utc::now()).await.unwrap_err();
    assert_eq!(err.error_code(), "ON_COOLDOWN");
    assert_eq!(state.ledger.balance_of(&user).await.unwrap(), 90);

    // 冷却期结束后可以再次领取
    state
        .rewards
        .claim(claim_cmd(&user, reward), Utc::now() + Duration::days(5))
        .await
        .unwrap();
    assert_eq!(count_ledger(&pool, &user, "REWARD_CLAIMED").await, 2);
}

#[tokio::test]
#[ignore = "需要 PostgreSQL 数据库连接"]
async fn test_stackable_reward_respects_max_stack() {
    let (pool, state) = setup().await;
    let user = unique_user("stack");
    let reward = seed_reward(
        &pool,
        "TOKEN_MULTIPLIER",
        json!({"type": "TOKEN_MULTIPLIER", "factor": 2.0, "durationHours": 48}),
        20,
        None,
        true,
        1,
    )
    .await;
    grant_tokens(&state, &user, 100).await;

    let first = state.rewards.claim(claim_cmd(&user, reward), Utc::now()).await.unwrap();
    assert_eq!(inventory_quantity(&pool, &user, reward).await, 1);

    let err = state.rewards.claim(claim_cmd(&user, reward), Utc::now()).await.unwrap_err();
    assert_eq!(err.error_code(), "STACK_LIMIT_REACHED");
    assert_eq!(state.ledger.balance_of(&user).await.unwrap(), 80);

    // 核销后释放库存
    state
        .rewards
        .mark_used(&user, first.claimed_reward.id, Utc::now())
        .await
        .unwrap();
    assert_eq!(inventory_quantity(&pool, &user, reward).await, 0);
    state.rewards.claim(claim_cmd(&user, reward), Utc::now()).await.unwrap();
    assert_eq!(state.ledger.balance_of(&user).await.unwrap(), 60);
}

#[tokio::test]
#[ignore = "需要 PostgreSQL 数据库连接"]
async fn test_expired_stackable_frees_inventory() {
    let (pool, state) = setup().await;
    let user = unique_user("stack-expire");
    let reward = seed_reward(
        &pool,
        "TOKEN_MULTIPLIER",
        json!({"type": "TOKEN_MULTIPLIER", "factor": 1.5, "durationHours": 24}),
        10,
        None,
        true,
        1,
    )
    .await;
    grant_tokens(&state, &user, 20).await;

    state.rewards.claim(claim_cmd(&user, reward), days_ago(3)).await.unwrap();
    assert_eq!(inventory_quantity(&pool, &user, reward).await, 1);

    while state.rewards.expire_due(Utc::now(), 500).await.unwrap() == 500 {}
    assert_eq!(inventory_quantity(&pool, &user, reward).await, 0);

    state.rewards.claim(claim_cmd(&user, reward), Utc::now()).await.unwrap();
}

#[tokio::test]
#[ignore = "需要 PostgreSQL 数据库连接"]
async fn test_active_multiplier_scales_attendance_reward() {
    let (pool, state) = setup().await;
    let user = unique_user("multiplier");
    let gym_id = seed_gym_for(&pool, &user).await;
    let reward = seed_reward(
        &pool,
        "TOKEN_MULTIPLIER",
        json!({"type": "TOKEN_MULTIPLIER", "factor": 2.0, "durationHours": 48}),
        30,
        None,
        false,
        1,
    )
    .await;
    grant_tokens(&state, &user, 30).await;
    let base = GamificationSettings::default().attendance.base_reward_tokens;

    let yesterday = days_ago(1);
    let claimed = state
        .rewards
        .claim(claim_cmd(&user, reward), yesterday)
        .await
        .unwrap()
        .claimed_reward;

    let boosted = check_in_on(&state, &user, gym_id, yesterday).await;
    assert_eq!(boosted.tokens_awarded, base * 2);

    // 核销后倍率不再生效，即使仍在生效窗口内
    state.rewards.mark_used(&user, claimed.id, Utc::now()).await.unwrap();
    let plain = check_in_on(&state, &user, gym_id, Utc::now()).await;
    assert_eq!(plain.tokens_awarded, base);
}

#[tokio::test]
#[ignore = "需要 PostgreSQL 数据库连接"]
async fn test_positive_adjustment_refreshes_achievement_view() {
    let (pool, state) = setup().await;
    sqlx::query(
        r#"
        INSERT INTO achievement_definitions (code, name, category, metric_type, target_value,
                                             token_reward, is_active, sort_order)
        VALUES ('IT_TOKENS_HUGE', 'IntegTest token hoard', 'TOKENS', 'TOKENS_EARNED', 1000000000, 0, TRUE, 0)
        ON CONFLICT (code) DO UPDATE SET target_value = 1000000000, is_active = TRUE
        "#,
    )
    .execute(&pool)
    .await
    .unwrap();
    // 定义直接写库，目录缓存需要手动清除
    let _ = state.cache.delete(&CacheKey::achievement_catalog()).await;
    let user = unique_user("view");

    let progress_of = |views: Vec<gamification::UserAchievementView>| {
        views
            .into_iter()
            .find(|v| v.code == "IT_TOKENS_HUGE")
            .map(|v| v.progress.value)
    };

    grant_tokens(&state, &user, 10).await;
    let before = state.achievements.list_for_user(&user).await.unwrap();
    assert_eq!(progress_of(before), Some(10));

    grant_tokens(&state, &user, 15).await;
    let after = state.achievements.list_for_user(&user).await.unwrap();
    assert_eq!(progress_of(after), Some(25));
}
