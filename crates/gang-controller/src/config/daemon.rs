use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Clone)]
pub struct DaemonArgs {
    #[arg(
        long,
        env = "KUBECONFIG",
        value_hint = clap::ValueHint::FilePath,
        help = "Path to a kubeconfig file; in-cluster configuration is used when unset"
    )]
    pub kubeconfig: Option<PathBuf>,

    #[arg(
        long,
        env = "WATCH_NAMESPACE",
        help = "Namespace to watch for pods and workload templates; all namespaces when unset"
    )]
    pub namespace: Option<String>,

    #[arg(
        long = "scheduler-name",
        default_values_t = [String::from("gang-scheduler")],
        help = "Scheduler name whose pods are grouped; repeat the flag to serve several schedulers"
    )]
    pub scheduler_names: Vec<String>,

    #[arg(
        long,
        help = "Copy gang-scheduler.dev annotations from the owning workload template onto new groups",
        default_value_t = true,
        action = clap::ArgAction::Set
    )]
    pub inherit_owner_annotations: bool,
}
