//! Subcommands.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result, bail};
use clap::Subcommand;
use scxml_client::{ApiClient, EventStreamClient, InstanceEvent, StreamOptions};
use scxml_core::ResourceRef;
use scxml_settings::ClientSettings;
use scxml_sync::viz::StderrReporter;
use scxml_sync::{ConsoleSubscriber, TextRenderer, VisualizationSynchronizer};

const DEFINITION_SUFFIX: &str = ".scxml";

/// Subcommands of `scxml`.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create or replace a statechart definition from a file.
    Save {
        /// Path to the SCXML document.
        path: PathBuf,
        /// Definition name (defaults to the file name).
        #[arg(short = 'n', long = "name")]
        name: Option<String>,
        /// Handlers module uploaded alongside the document.
        #[arg(long)]
        handlers: Option<PathBuf>,
        /// Keep running and save again every time the file changes.
        #[arg(short = 'w', long)]
        watch: bool,
    },
    /// Print a definition document or an instance configuration.
    Cat {
        /// `name` or `name/id`.
        id: ResourceRef,
    },
    /// List definitions, or the instances of one definition.
    Ls {
        name: Option<String>,
    },
    /// Start an instance of a definition.
    Run {
        name: String,
        /// Instance id (server-assigned when omitted).
        #[arg(short = 'n', long = "id")]
        id: Option<String>,
    },
    /// Send an event to an instance.
    Send {
        /// `name/id` of the instance.
        id: ResourceRef,
        event: String,
        /// Event data.
        #[arg(short = 'd', long = "data")]
        data: Option<String>,
    },
    /// Delete a definition (with its instances) or one instance.
    Rm {
        id: ResourceRef,
    },
    /// Print changes to a definition or an instance as they happen.
    Subscribe {
        id: ResourceRef,
    },
    /// Draw a definition and keep it in step with its changes.
    View {
        id: ResourceRef,
    },
}

impl Command {
    /// Run against the service named in `settings`.
    pub async fn execute(self, settings: &ClientSettings) -> Result<ExitCode> {
        let base = settings.api_url();
        let api = ApiClient::new(&base);

        match self {
            Self::Save {
                path,
                name,
                handlers,
                watch,
            } => {
                let name = definition_name(&path, name.as_deref())?;
                if watch {
                    crate::watch::save_on_change(&api, &name, &path, handlers.as_deref(), shutdown_signal()).await?;
                } else {
                    Definition::read(&path, handlers.as_deref())?.upload(&api, &name).await?;
                }
            }
            Self::Cat { id } => match id.instance_id() {
                Some(instance) => {
                    let configuration = api
                        .get_instance(id.definition_name(), instance)
                        .await
                        .context("Error getting instance detail")?;
                    println!("{}", serde_json::to_string_pretty(&configuration)?);
                }
                None => {
                    let text = api
                        .get_definition(id.definition_name())
                        .await
                        .context("Error getting statechart detail")?;
                    println!("{text}");
                }
            },
            Self::Ls { name } => {
                let items = match &name {
                    Some(name) => api.list_instances(name).await.context("Error getting instance list")?,
                    None => api.list_definitions().await.context("Error getting statechart list")?,
                };
                for item in items {
                    println!("{item}");
                }
            }
            Self::Run { name, id } => {
                let location = api
                    .create_instance(&name, id.as_deref())
                    .await
                    .context("Error on instance creation")?;
                println!("Instance created");
                if let Some(location) = location {
                    println!("InstanceId: {location}");
                }
            }
            Self::Send { id, event, data } => {
                let Some(instance) = id.instance_id() else {
                    bail!("`{id}` does not name an instance (expected name/id)");
                };
                let event = InstanceEvent {
                    name: &event,
                    data: data.as_deref(),
                };
                let configuration = api
                    .send_event(id.definition_name(), instance, &event)
                    .await
                    .context("Error sending event")?;
                println!("Event sent");
                if let Some(configuration) = configuration {
                    println!("Current state: {configuration}");
                }
            }
            Self::Rm { id } => {
                api.delete(&id).await.context("Error deleting")?;
                match id.instance_id() {
                    Some(_) => println!("Deleted instance"),
                    None => println!("Deleted statechart and its instances"),
                }
            }
            Self::Subscribe { id } => {
                let streams = EventStreamClient::new(&base, StreamOptions::from(&settings.stream));
                let outcome = ConsoleSubscriber::stdio(&id)
                    .attach(&streams, id)
                    .run_until(shutdown_signal())
                    .await;
                // The subscriber has already printed the error line.
                if outcome.is_failure() {
                    return Ok(ExitCode::FAILURE);
                }
            }
            Self::View { id } => {
                let sync = VisualizationSynchronizer::new(
                    id,
                    &base,
                    StreamOptions::from(&settings.stream),
                    TextRenderer::stdout(),
                    StderrReporter,
                );
                let handle = sync.handle();
                let task = tokio::spawn(sync.run());
                shutdown_signal().await;
                handle.stop();
                let _ = task.await.context("visualization task failed")?;
            }
        }
        Ok(ExitCode::SUCCESS)
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
}

/// Name to save a definition under: `-n foo` becomes `foo.scxml`, otherwise
/// the file name is used as is.
fn definition_name(path: &Path, name: Option<&str>) -> Result<String> {
    if let Some(name) = name {
        if name.ends_with(DEFINITION_SUFFIX) {
            return Ok(name.to_string());
        }
        return Ok(format!("{name}{DEFINITION_SUFFIX}"));
    }
    match path.file_name().and_then(|n| n.to_str()) {
        Some(file_name) => Ok(file_name.to_string()),
        None => bail!("cannot derive a statechart name from {}", path.display()),
    }
}

/// A definition document and its optional handlers module, as read from disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Definition {
    pub(crate) scxml: String,
    pub(crate) handlers: Option<String>,
}

impl Definition {
    pub(crate) fn read(path: &Path, handlers: Option<&Path>) -> Result<Self> {
        let scxml = std::fs::read_to_string(path)
            .with_context(|| format!("Error reading file {}", path.display()))?;
        let handlers = handlers
            .map(|h| std::fs::read_to_string(h).with_context(|| format!("Error reading file {}", h.display())))
            .transpose()?;
        Ok(Self { scxml, handlers })
    }

    pub(crate) async fn upload(&self, api: &ApiClient, name: &str) -> Result<()> {
        let location = api
            .save_definition(name, &self.scxml, self.handlers.as_deref())
            .await
            .context("Error saving statechart")?;
        println!("Statechart saved");
        println!("StateChartName: {}", location.as_deref().unwrap_or(name));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser, Debug)]
    struct Harness {
        #[command(subcommand)]
        command: Command,
    }

    fn parse(args: &[&str]) -> Command {
        let mut argv = vec!["scxml"];
        argv.extend_from_slice(args);
        Harness::try_parse_from(argv).unwrap().command
    }

    #[test]
    fn name_defaults_to_file_name() {
        assert_eq!(definition_name(Path::new("/tmp/door.scxml"), None).unwrap(), "door.scxml");
    }

    #[test]
    fn explicit_name_gets_suffix_once() {
        assert_eq!(definition_name(Path::new("x.xml"), Some("door")).unwrap(), "door.scxml");
        assert_eq!(definition_name(Path::new("x.xml"), Some("door.scxml")).unwrap(), "door.scxml");
    }

    #[test]
    fn path_without_file_name_is_an_error() {
        assert!(definition_name(Path::new("/"), None).is_err());
    }

    #[test]
    fn reads_document_and_handlers() {
        let dir = tempfile::tempdir().unwrap();
        let doc = dir.path().join("door.scxml");
        let handlers = dir.path().join("handlers.js");
        std::fs::write(&doc, "<scxml/>").unwrap();
        std::fs::write(&handlers, "module.exports = {};").unwrap();

        let definition = Definition::read(&doc, Some(&handlers)).unwrap();
        assert_eq!(definition.scxml, "<scxml/>");
        assert_eq!(definition.handlers.as_deref(), Some("module.exports = {};"));

        assert!(Definition::read(&doc, None).unwrap().handlers.is_none());
    }

    #[test]
    fn missing_file_names_the_path() {
        let err = Definition::read(Path::new("/nonexistent/door.scxml"), None).unwrap_err();
        assert!(format!("{err:#}").contains("/nonexistent/door.scxml"));
    }

    #[test]
    fn identifiers_parse_into_resources() {
        match parse(&["subscribe", "chart1/inst1"]) {
            Command::Subscribe { id } => assert_eq!(id, ResourceRef::instance("chart1", "inst1")),
            other => panic!("unexpected {other:?}"),
        }
        match parse(&["rm", "chart1"]) {
            Command::Rm { id } => assert_eq!(id, ResourceRef::definition("chart1")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn send_and_run_flags() {
        match parse(&["send", "door.scxml/abc", "open", "-d", "{\"force\":1}"]) {
            Command::Send { id, event, data } => {
                assert_eq!(id.instance_id(), Some("abc"));
                assert_eq!(event, "open");
                assert_eq!(data.as_deref(), Some("{\"force\":1}"));
            }
            other => panic!("unexpected {other:?}"),
        }
        match parse(&["run", "door.scxml", "-n", "mine"]) {
            Command::Run { name, id } => {
                assert_eq!(name, "door.scxml");
                assert_eq!(id.as_deref(), Some("mine"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn save_flags() {
        match parse(&["save", "door.xml", "-n", "door", "--handlers", "h.js"]) {
            Command::Save {
                path,
                name,
                handlers,
                watch,
            } => {
                assert_eq!(path, PathBuf::from("door.xml"));
                assert_eq!(name.as_deref(), Some("door"));
                assert_eq!(handlers, Some(PathBuf::from("h.js")));
                assert!(!watch);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_watching(parse(&["save", "door.scxml", "-w"]));
        assert_watching(parse(&["save", "door.scxml", "--watch"]));
    }

    fn assert_watching(command: Command) {
        match command {
            Command::Save { watch, .. } => assert!(watch),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn save_puts_the_document_as_xml() {
        use wiremock::matchers::{body_string, header, method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/door.scxml"))
            .and(header("content-type", "application/xml"))
            .and(body_string("<scxml/>"))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let doc = dir.path().join("door.scxml");
        std::fs::write(&doc, "<scxml/>").unwrap();

        let definition = Definition::read(&doc, None).unwrap();
        definition
            .upload(&ApiClient::new(server.uri()), "door.scxml")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn send_to_a_definition_is_rejected() {
        let command = parse(&["send", "door.scxml", "open"]);
        let err = command.execute(&ClientSettings::default()).await.unwrap_err();
        assert!(err.to_string().contains("does not name an instance"));
    }
}
