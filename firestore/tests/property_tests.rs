//! Property-based tests for cloudfn-firestore.

use cloudfn_common::RetryBudget;
use cloudfn_firestore::{ErrorClass, ErrorClassifier, FirestoreError, FirestoreStore, TransientErrorClassifier};
use cloudfn_test_utils::{
    ScriptedConnector, allowed_collection_strategy, document_id_strategy, entity_strategy,
    fatal_error_strategy, transient_error_strategy, unknown_collection_strategy,
};
use proptest::prelude::*;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_transient_errors_are_retryable(err in transient_error_strategy()) {
        prop_assert_eq!(TransientErrorClassifier.classify(&err), ErrorClass::Retryable);
    }

    #[test]
    fn prop_fatal_errors_are_fatal(err in fatal_error_strategy()) {
        prop_assert_eq!(TransientErrorClassifier.classify(&err), ErrorClass::Fatal);
    }

    #[test]
    fn prop_unknown_collections_never_reach_backend(
        collection in unknown_collection_strategy(),
        id in document_id_strategy(),
        entity in entity_strategy(),
    ) {
        tokio_test::block_on(async {
            let connector = ScriptedConnector::new();
            let store = FirestoreStore::new(connector.clone()).with_budget(RetryBudget::Fixed(3));
            let mut session = store.connect().await.unwrap();

            let add = store.add_entity(&mut session, &collection, &entity).await;
            let get = store.get_entity(&mut session, &collection, &id).await;
            let edit = store.edit_entity(&mut session, &collection, &id, &entity).await;
            let delete = store.delete_entity(&mut session, &collection, &id).await;

            assert!(matches!(add, Err(FirestoreError::UnknownCollection(_))));
            assert!(matches!(get, Err(FirestoreError::UnknownCollection(_))));
            assert!(matches!(edit, Err(FirestoreError::UnknownCollection(_))));
            assert!(matches!(delete, Err(FirestoreError::UnknownCollection(_))));
            assert_eq!(connector.backend_calls(), 0);
        });
    }

    #[test]
    fn prop_calls_bounded_by_budget(
        budget in 1u32..8,
        failures in 0u32..10,
        collection in allowed_collection_strategy(),
        entity in entity_strategy(),
        err in transient_error_strategy(),
    ) {
        tokio_test::block_on(async {
            let connector = ScriptedConnector::new().fail_times(failures, &err);
            let store = FirestoreStore::new(connector.clone()).with_budget(RetryBudget::Fixed(budget));
            let mut session = store.connect().await.unwrap();

            let result = store.add_entity(&mut session, &collection, &entity).await;

            if failures < budget {
                assert!(result.is_ok());
                assert_eq!(connector.backend_calls(), failures + 1);
                assert_eq!(connector.closes(), failures);
                assert_eq!(connector.count(&collection), 1);
            } else {
                assert!(
                    matches!(result, Err(FirestoreError::RetriesExhausted { attempts, .. }) if attempts == budget)
                );
                assert_eq!(connector.backend_calls(), budget);
                assert_eq!(connector.count(&collection), 0);
            }
        });
    }

    #[test]
    fn prop_fatal_first_error_means_one_call(
        budget in 1u32..8,
        id in document_id_strategy(),
        err in fatal_error_strategy(),
    ) {
        tokio_test::block_on(async {
            let connector = ScriptedConnector::new().fail_next(err);
            let store = FirestoreStore::new(connector.clone()).with_budget(RetryBudget::Fixed(budget));
            let mut session = store.connect().await.unwrap();

            let result = store.delete_entity(&mut session, "users", &id).await;

            assert!(matches!(result, Err(FirestoreError::Backend { .. })));
            assert_eq!(connector.backend_calls(), 1);
            assert_eq!(connector.connects(), 1);
        });
    }
}
