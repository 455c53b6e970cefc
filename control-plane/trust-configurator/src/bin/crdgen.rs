use kube::core::CustomResourceExt;
use trust_configurator::crd::{OpenIDConnect, Shoot};

fn main() {
    for crd in [OpenIDConnect::crd(), Shoot::crd()] {
        let yaml = serde_yaml::to_string(&crd).expect("serialize CRD to YAML");
        println!("---\n{}", yaml);
    }
}
