// Integration tests that expect a running cluster with the Shoot and
// OpenIDConnect CRDs installed (see the crdgen binary).
// Enable via: cargo test -p trust-configurator --test it_k8s -- --ignored

use std::sync::Arc;
use std::time::Duration;

use kube::{
    Client,
    api::{Api, DeleteParams, PostParams},
};
use trust_configurator::config::TrustConfig;
use trust_configurator::controller::{ControllerContext, run_shoot_controller};
use trust_configurator::crd::{OpenIDConnect, Shoot};
use trust_configurator::store::{KubeStore, TrustStore};
use trust_configurator::{FINALIZER, names};

mod common;
use common::{NS, trusted_shoot, uniq};

async fn wait_for_oidc(api: &Api<OpenIDConnect>, name: &str, present: bool) {
    for _ in 0..60 {
        if api.get_opt(name).await.unwrap_or(None).is_some() == present {
            return;
        }
        tokio::time::sleep(Duration::from_millis(500)).await;
    }
    panic!("OpenIDConnect {name} present={present} not reached in time");
}

#[test_log::test(tokio::test)]
#[ignore]
async fn controller_manages_openidconnect_lifecycle() {
    let client = Client::try_default().await.expect("kube client");
    let shoots: Api<Shoot> = Api::namespaced(client.clone(), NS);
    let oidcs: Api<OpenIDConnect> = Api::all(client.clone());

    let store: Arc<dyn TrustStore> = Arc::new(KubeStore::new(client.clone()));
    let ctx = Arc::new(ControllerContext::new(store, TrustConfig::default()));
    let ready = ctx.ready.clone();
    let ctrl = tokio::spawn(run_shoot_controller(client.clone(), ctx));
    for _ in 0..60 {
        if ready.is_ready() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(500)).await;
    }
    assert!(ready.is_ready(), "shoot cache never synced");

    let name = uniq("it-shoot");
    let mut shoot = trusted_shoot(&name, "ignored");
    shoot.metadata.uid = None;
    let status = shoot.status.take();
    let mut created = shoots
        .create(&PostParams::default(), &shoot)
        .await
        .expect("create shoot");
    created.status = status;
    let created = shoots
        .replace_status(
            &name,
            &PostParams::default(),
            serde_json::to_vec(&created).expect("serialize"),
        )
        .await
        .expect("set status");

    let uid = created.metadata.uid.clone().expect("uid");
    let oidc_name = names::encode(NS, &name, &uid);
    wait_for_oidc(&oidcs, &oidc_name, true).await;
    let stored = shoots.get(&name).await.expect("get shoot");
    assert!(stored.has_finalizer(FINALIZER));

    shoots
        .delete(&name, &DeleteParams::default())
        .await
        .expect("delete shoot");
    wait_for_oidc(&oidcs, &oidc_name, false).await;

    ctrl.abort();
}
