/// Everything needed to create one service replica.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CreateSpec {
    pub name: String,
    pub image: String,
    pub labels: Vec<(String, String)>,
    pub networks: Vec<String>,
    pub hostname: Option<String>,
    pub env: Vec<String>,
    pub ports: Vec<String>,
    pub volumes: Vec<String>,
    pub restart: Option<String>,
    pub platform: Option<String>,
    pub workdir: Option<String>,
    pub user: Option<String>,
    pub entrypoint: Option<Vec<String>>,
    pub command: Vec<String>,
}

/// A single engine operation, independent of how it is executed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    Create(CreateSpec),
    Start { id: String },
    Stop { id: String, time: Option<u32> },
    Restart { id: String, time: Option<u32> },
    Kill {
        id: String,
        signal: Option<String>,
    },
    Pause { id: String },
    Unpause { id: String },
    Remove { id: String, force: bool },
    Top { id: String },
    ListContainers {
        filters: Vec<(String, String)>,
    },
    CreateNetwork {
        name: String,
        driver: Option<String>,
        labels: Vec<(String, String)>,
    },
    InspectNetwork { name: String },
    RemoveNetwork { name: String },
    CreateVolume {
        name: String,
        driver: Option<String>,
        labels: Vec<(String, String)>,
    },
    InspectVolume { name: String },
    RemoveVolume { name: String },
    InspectImage { reference: String },
    PullImage {
        reference: String,
        platform: Option<String>,
        verify: Option<String>,
    },
    BuildImage {
        context: String,
        dockerfile: Option<String>,
        tag: String,
        platform: Option<String>,
    },
}

impl Intent {
    /// Flatten the intent into the argument vector passed after the engine prefix.
    ///
    /// Resource-creating intents always end with the resource name so the
    /// engine sees flags first.
    pub fn to_args(&self) -> Vec<String> {
        match self {
            Intent::Create(spec) => create_args(spec),
            Intent::Start { id } => vec!["start".into(), id.clone()],
            Intent::Stop { id, time } => timed("stop", id, *time),
            Intent::Restart { id, time } => timed("restart", id, *time),
            Intent::Kill { id, signal } => {
                let mut args = vec!["kill".to_string()];
                if let Some(signal) = signal {
                    args.push(format!("--signal={signal}"));
                }
                args.push(id.clone());
                args
            }
            Intent::Pause { id } => vec!["pause".into(), id.clone()],
            Intent::Unpause { id } => vec!["unpause".into(), id.clone()],
            Intent::Remove { id, force } => {
                let mut args = vec!["rm".to_string()];
                if *force {
                    args.push("-f".into());
                }
                args.push(id.clone());
                args
            }
            Intent::Top { id } => vec!["top".into(), id.clone()],
            Intent::ListContainers { filters } => {
                let mut args = vec![
                    "ps".to_string(),
                    "-a".into(),
                    "--no-trunc".into(),
                    "--format={{json .}}".into(),
                ];
                args.extend(filters.iter().map(|(k, v)| format!("--filter=label={k}={v}")));
                args
            }
            Intent::CreateNetwork { name, driver, labels } => {
                resource_create("network", name, driver.as_deref(), labels)
            }
            Intent::InspectNetwork { name } => {
                vec!["network".into(), "inspect".into(), name.clone()]
            }
            Intent::RemoveNetwork { name } => vec!["network".into(), "rm".into(), name.clone()],
            Intent::CreateVolume { name, driver, labels } => {
                resource_create("volume", name, driver.as_deref(), labels)
            }
            Intent::InspectVolume { name } => vec!["volume".into(), "inspect".into(), name.clone()],
            Intent::RemoveVolume { name } => vec!["volume".into(), "rm".into(), name.clone()],
            Intent::InspectImage { reference } => {
                vec!["image".into(), "inspect".into(), reference.clone()]
            }
            Intent::PullImage { reference, platform, verify } => {
                let mut args = vec!["pull".to_string()];
                if let Some(platform) = platform {
                    args.push(format!("--platform={platform}"));
                }
                if let Some(verify) = verify {
                    args.push(format!("--verify={verify}"));
                }
                args.push(reference.clone());
                args
            }
            Intent::BuildImage { context, dockerfile, tag, platform } => {
                let mut args = vec!["build".to_string(), format!("--tag={tag}")];
                if let Some(dockerfile) = dockerfile {
                    args.push(format!("--file={dockerfile}"));
                }
                if let Some(platform) = platform {
                    args.push(format!("--platform={platform}"));
                }
                args.push(context.clone());
                args
            }
        }
    }
}

// The engine flag is `--time`, not `--timeout`.
fn timed(verb: &str, id: &str, time: Option<u32>) -> Vec<String> {
    let mut args = vec![verb.to_string()];
    if let Some(secs) = time {
        args.push(format!("--time={secs}"));
    }
    args.push(id.to_string());
    args
}

fn label_args(labels: &[(String, String)]) -> impl Iterator<Item = String> + '_ {
    labels.iter().map(|(k, v)| format!("--label={k}={v}"))
}

fn resource_create(
    kind: &str,
    name: &str,
    driver: Option<&str>,
    labels: &[(String, String)],
) -> Vec<String> {
    let mut args = vec![kind.to_string(), "create".into()];
    if let Some(driver) = driver {
        args.push(format!("--driver={driver}"));
    }
    args.extend(label_args(labels));
    args.push(name.to_string());
    args
}

fn create_args(spec: &CreateSpec) -> Vec<String> {
    let mut args = vec!["create".to_string(), format!("--name={}", spec.name)];
    args.extend(label_args(&spec.labels));
    args.extend(spec.networks.iter().map(|n| format!("--network={n}")));
    if let Some(hostname) = &spec.hostname {
        args.push(format!("--hostname={hostname}"));
    }
    args.extend(spec.env.iter().map(|e| format!("--env={e}")));
    args.extend(spec.ports.iter().map(|p| format!("--publish={p}")));
    args.extend(spec.volumes.iter().map(|v| format!("--volume={v}")));
    if let Some(restart) = &spec.restart {
        args.push(format!("--restart={restart}"));
    }
    if let Some(platform) = &spec.platform {
        args.push(format!("--platform={platform}"));
    }
    if let Some(workdir) = &spec.workdir {
        args.push(format!("--workdir={workdir}"));
    }
    if let Some(user) = &spec.user {
        args.push(format!("--user={user}"));
    }

    // `--entrypoint` takes a single program; any extra entrypoint words
    // go in front of the command.
    let mut trailing = Vec::new();
    if let Some(entrypoint) = &spec.entrypoint
        && let Some((program, rest)) = entrypoint.split_first()
    {
        args.push(format!("--entrypoint={program}"));
        trailing.extend(rest.iter().cloned());
    }
    args.push(spec.image.clone());
    args.extend(trailing);
    args.extend(spec.command.iter().cloned());
    args
}
