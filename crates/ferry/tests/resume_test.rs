//! Endpoint logs and checkpoints survive a restart on the same LMDB path

mod common;

use common::{msg, quiet_config, with_provider};
use ferry::prelude::*;
use std::sync::Arc;

async fn shutdown(fx: common::Fixture) {
    let common::Fixture {
        provider,
        checkpoints,
        store,
    } = fx;
    store.close().await;
    drop(checkpoints);
    provider.close().unwrap();
}

fn open(path: &std::path::Path) -> common::Fixture {
    let provider = Arc::new(StoreProvider::open_lmdb(DbStoreConfig::new(path)).unwrap());
    with_provider(provider, quiet_config())
}

#[tokio::test]
async fn test_resume_after_checkpoint() {
    let temp_dir = tempfile::tempdir().unwrap();

    {
        let fx = open(temp_dir.path());
        fx.store.add_endpoint("e").unwrap();
        fx.checkpoints
            .set_checkpoint_data("e", &CheckpointData::new(5))
            .unwrap();
        shutdown(fx).await;
    }

    let fx = open(temp_dir.path());
    fx.store.add_endpoint("e").unwrap();
    assert_eq!(fx.store.add("e", msg("m1")).unwrap().offset, 6);
    shutdown(fx).await;
}

#[tokio::test]
async fn test_stored_tail_ahead_of_checkpoint_is_not_reused() {
    let temp_dir = tempfile::tempdir().unwrap();

    {
        let fx = open(temp_dir.path());
        fx.store.add_endpoint("e").unwrap();
        for id in ["m0", "m1", "m2"] {
            fx.store.add("e", msg(id)).unwrap();
        }
        fx.checkpoints
            .set_checkpoint_data("e", &CheckpointData::new(0))
            .unwrap();
        shutdown(fx).await;
    }

    let fx = open(temp_dir.path());
    fx.store.add_endpoint("e").unwrap();
    assert_eq!(fx.store.add("e", msg("m3")).unwrap().offset, 3);

    // unconsumed messages are still readable after the restart
    let mut iter = fx.store.get_message_iterator("e", 1).unwrap();
    let ids: Vec<String> = iter
        .get_next(10)
        .unwrap()
        .iter()
        .filter_map(|m| m.message_id().map(str::to_string))
        .collect();
    assert_eq!(ids, vec!["m1", "m2", "m3"]);
    assert_eq!(fx.store.message_ref_count("m1").unwrap(), Some(1));

    let info = fx.store.endpoint_info("e").unwrap();
    assert_eq!(info.checkpoint_offset, 0);
    assert_eq!(info.lag, 3);
    shutdown(fx).await;
}
