use chrono::Utc;
use dream_quota_server::{
    database::{Ledger, MemoryLedger},
    models::{Admission, QuotaPolicy, SubscriptionTier, UserAccount},
};
use futures::future::join_all;
use std::sync::Arc;
use uuid::Uuid;

async fn race_admissions(ledger: Arc<MemoryLedger>, user_id: Uuid, policy: QuotaPolicy, attempts: usize) -> usize {
    let handles = (0..attempts).map(|i| {
        let ledger = ledger.clone();
        tokio::spawn(async move {
            ledger
                .admit_job(user_id, Some(format!("dream {}", i)), policy, Utc::now())
                .await
        })
    });

    join_all(handles)
        .await
        .into_iter()
        .map(|joined| joined.expect("admission task panicked").expect("admission failed"))
        .filter(|admission| matches!(admission, Admission::Admitted { .. }))
        .count()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_free_admissions_never_overspend() {
    let ledger = Arc::new(MemoryLedger::new());
    let user_id = Uuid::new_v4();
    ledger.provision_account(user_id, 5).await.unwrap();

    let admitted = race_admissions(ledger.clone(), user_id, QuotaPolicy::default(), 20).await;

    assert_eq!(admitted, 5);
    let account = ledger.find_account(user_id).await.unwrap().unwrap();
    assert_eq!(account.credits_remaining, 0);
    assert_eq!(ledger.list_jobs(user_id, 100, 0).await.unwrap().len(), 5);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_pro_admissions_respect_monthly_limit() {
    let ledger = Arc::new(MemoryLedger::new());
    let user_id = Uuid::new_v4();
    let mut account = UserAccount::new_free(user_id, 0);
    account.subscription_tier = SubscriptionTier::Pro;
    ledger.insert_account(account).await;

    let policy = QuotaPolicy { monthly_limit: 3 };
    let admitted = race_admissions(ledger.clone(), user_id, policy, 12).await;

    assert_eq!(admitted, 3);
    assert_eq!(ledger.list_jobs(user_id, 100, 0).await.unwrap().len(), 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_decrements_stop_at_zero() {
    let ledger = Arc::new(MemoryLedger::new());
    let user_id = Uuid::new_v4();
    ledger.provision_account(user_id, 4).await.unwrap();

    let handles = (0..16).map(|_| {
        let ledger = ledger.clone();
        tokio::spawn(async move { ledger.decrement_credits(user_id).await })
    });
    let taken = join_all(handles)
        .await
        .into_iter()
        .filter(|result| matches!(result, Ok(Ok(true))))
        .count();

    assert_eq!(taken, 4);
    let account = ledger.find_account(user_id).await.unwrap().unwrap();
    assert_eq!(account.credits_remaining, 0);
}
