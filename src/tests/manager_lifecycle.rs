// Lifecycle of the manager: start / get_token / stop transitions.

#[cfg(test)]
mod test {
    use std::sync::Arc;
    use std::time::Duration;

    use tokio::time::sleep;

    use crate::cache::token::TokenRecord;
    use crate::error::{StateError, TokenError};
    use crate::manager::{AutoManagedTokenManager, ManagerState, RefreshSettings};
    use crate::tests::common::{record, ScriptedExchange};

    fn illegal_state(err: &TokenError) -> Option<ManagerState> {
        match err {
            TokenError::State(StateError::IllegalState { state, .. }) => Some(*state),
            _ => None,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn get_token_before_start_is_a_state_error() {
        let exchange = ScriptedExchange::issuing("abc", 3600);
        let manager = AutoManagedTokenManager::new(exchange.clone(), RefreshSettings::default());

        let err = manager.get_token().unwrap_err();
        assert_eq!(illegal_state(&err), Some(ManagerState::NotStarted));
        assert_eq!(exchange.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn start_serves_the_issued_token() {
        let exchange = ScriptedExchange::issuing("abc", 3600);
        let manager = AutoManagedTokenManager::new(exchange.clone(), RefreshSettings::default());

        manager.start().await.unwrap();

        assert_eq!(manager.state(), ManagerState::Running);
        assert_eq!(manager.get_token().unwrap(), "abc");
        assert_eq!(manager.metrics().up.get(), 1);
        assert_eq!(exchange.calls(), 1);

        manager.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn inactive_token_fails_start_and_spawns_nothing() {
        let mut inactive = TokenRecord::new("abc", 3600);
        inactive.active = false;
        let exchange = ScriptedExchange::new(Ok(inactive));
        let manager = AutoManagedTokenManager::new(exchange.clone(), RefreshSettings::default());

        let err = manager.start().await.unwrap_err();
        assert_eq!(err, TokenError::InactiveToken);
        assert_eq!(manager.state(), ManagerState::NotStarted);
        assert!(manager.last_known_token().is_none());

        sleep(Duration::from_secs(7200)).await;
        assert_eq!(exchange.calls(), 1);

        // still NotStarted, so start may be retried
        exchange.set_fallback(record("abc", 3600));
        manager.start().await.unwrap();
        assert_eq!(manager.get_token().unwrap(), "abc");
        manager.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn second_start_is_rejected_without_an_exchange() {
        let exchange = ScriptedExchange::issuing("abc", 3600);
        let manager = AutoManagedTokenManager::new(exchange.clone(), RefreshSettings::default());

        manager.start().await.unwrap();
        let err = manager.start().await.unwrap_err();

        assert_eq!(illegal_state(&err), Some(ManagerState::Running));
        assert_eq!(exchange.calls(), 1);
        manager.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn stop_before_start_is_a_no_op() {
        let manager = AutoManagedTokenManager::new(ScriptedExchange::issuing("abc", 3600), RefreshSettings::default());

        manager.stop().await;

        assert_eq!(manager.state(), ManagerState::NotStarted);
        manager.start().await.unwrap();
        assert_eq!(manager.get_token().unwrap(), "abc");
        manager.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn stop_is_idempotent_and_final() {
        let exchange = ScriptedExchange::issuing("abc", 3600);
        let manager = AutoManagedTokenManager::new(exchange.clone(), RefreshSettings::default());
        manager.start().await.unwrap();

        manager.stop().await;
        manager.stop().await;

        assert_eq!(manager.state(), ManagerState::Stopped);
        assert_eq!(manager.metrics().up.get(), 0);
        assert_eq!(illegal_state(&manager.get_token().unwrap_err()), Some(ManagerState::Stopped));
        assert_eq!(illegal_state(&manager.start().await.unwrap_err()), Some(ManagerState::Stopped));
        assert_eq!(
            illegal_state(&manager.refresh_token().await.unwrap_err()),
            Some(ManagerState::Stopped)
        );
        assert_eq!(exchange.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn nothing_changes_after_stop() {
        let exchange = ScriptedExchange::issuing("abc", 60);
        let manager = AutoManagedTokenManager::new(exchange.clone(), RefreshSettings::default());
        manager.start().await.unwrap();
        let before = manager.last_known_token().unwrap();

        manager.stop().await;
        sleep(Duration::from_secs(3600)).await;

        let after = manager.last_known_token().unwrap();
        assert!(Arc::ptr_eq(&before, &after));
        assert_eq!(after.value(), "abc");
        assert_eq!(exchange.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_discards_a_refresh_that_was_in_flight() {
        let exchange = ScriptedExchange::issuing("late", 3600)
            .then(record("first", 10))
            .with_latency(Duration::from_secs(2));
        let settings = RefreshSettings {
            safety_margin: Duration::from_secs(5),
            ..RefreshSettings::default()
        };
        let manager = AutoManagedTokenManager::new(exchange.clone(), settings);
        manager.start().await.unwrap();

        // scheduled refresh starts 5s after the first exchange began, and takes 2s
        sleep(Duration::from_secs(4)).await;
        assert_eq!(exchange.calls(), 2);

        manager.stop().await;

        assert_eq!(manager.last_known_token().unwrap().value(), "first");
        sleep(Duration::from_secs(60)).await;
        assert_eq!(exchange.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn oversized_lifetime_does_not_bring_the_manager_down() {
        let exchange = ScriptedExchange::issuing("abc", u64::MAX);
        let manager = AutoManagedTokenManager::new(exchange.clone(), RefreshSettings::default());

        manager.start().await.unwrap();
        assert_eq!(manager.get_token().unwrap(), "abc");
        assert!(manager.current_token().unwrap().expires_at_unix() > chrono::Utc::now().timestamp());

        sleep(Duration::from_secs(7 * 24 * 3600)).await;
        assert_eq!(manager.get_token().unwrap(), "abc");
        assert_eq!(exchange.calls(), 1);
        manager.stop().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn stop_racing_start_never_leaves_a_scheduler_behind() {
        for _ in 0..200 {
            let settings = RefreshSettings {
                safety_margin: Duration::from_secs(30),
                min_refresh_interval: Duration::from_millis(10),
                ..RefreshSettings::default()
            };
            let manager = Arc::new(AutoManagedTokenManager::new(ScriptedExchange::issuing("abc", 3600), settings));

            let starter = tokio::spawn({
                let manager = manager.clone();
                async move { manager.start().await }
            });
            let stopper = tokio::spawn({
                let manager = manager.clone();
                async move { manager.stop().await }
            });
            starter.await.unwrap().unwrap();
            stopper.await.unwrap();

            if manager.state() == ManagerState::Running {
                manager.stop().await;
            }
            assert_eq!(manager.state(), ManagerState::Stopped);
            // only the facade still holds the shared state once the scheduler is joined
            assert_eq!(Arc::strong_count(&manager.shared), 1);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_a_running_manager_cancels_the_scheduler() {
        let exchange = ScriptedExchange::issuing("abc", 1);
        let settings = RefreshSettings {
            safety_margin: Duration::ZERO,
            min_refresh_interval: Duration::from_millis(100),
            ..RefreshSettings::default()
        };
        let manager = AutoManagedTokenManager::new(exchange.clone(), settings);
        manager.start().await.unwrap();
        drop(manager);

        sleep(Duration::from_secs(10)).await;
        assert_eq!(exchange.calls(), 1);
    }
}
