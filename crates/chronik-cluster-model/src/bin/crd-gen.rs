//! Generate CRD YAML for ChronikKafka

fn main() -> anyhow::Result<()> {
    print!("{}", chronik_cluster_model::crds::crd_yaml()?);
    Ok(())
}
