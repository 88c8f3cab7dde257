//! Metrics exposition. Kept in its own test binary because the recorder is
//! process-global.

use std::net::Ipv4Addr;
use std::sync::Arc;

use microapp::bootstrap::{prepare_with, Inputs};
use microapp::discovery::{AddressError, Discovery, DiscoveryError};
use microapp::observability::metrics;

mod common;
use common::{sample_document, MemoryDiscovery};

#[tokio::test]
async fn registration_is_counted_when_recorder_installed_first() {
    let handle = metrics::install_recorder().unwrap();

    let blob = serde_json::to_vec(&sample_document()).unwrap();
    let discovery = Arc::new(MemoryDiscovery::with_kv("microapp", blob));
    let connect = {
        let discovery = discovery.clone();
        move |_: &str| Ok::<_, DiscoveryError>(discovery as Arc<dyn Discovery>)
    };

    let prepared = prepare_with(&Inputs::default(), connect, || {
        Ok::<_, AddressError>(Ipv4Addr::new(10, 0, 0, 7))
    })
    .await
    .unwrap();

    let rendered = handle.render();
    assert!(
        rendered.contains(r#"microapp_discovery_registrations_total{result="success"} 1"#),
        "rendered metrics:\n{}",
        rendered
    );

    prepared.registration.unwrap().deregister().await;
}
