//! Prints the UIPlugin CustomResourceDefinition as YAML.
//!
//! ```bash
//! cargo run --bin crdgen > config/crd/uiplugin.yaml
//! ```

use kube::CustomResourceExt;
use monitoring_stack_operator::crd::UIPlugin;

fn main() -> anyhow::Result<()> {
    print!("{}", serde_yaml::to_string(&UIPlugin::crd())?);
    Ok(())
}
