use nodectl::nodes::NodeRegistry;
use nodectl::service::{ServiceAction, ServiceController};

/// Applies a lifecycle action to the darknode service of every selected node.
pub async fn service(registry: &NodeRegistry, selection: super::Selection, action: ServiceAction) -> anyhow::Result<()> {
  let names = selection.resolve(registry)?;

  super::each_node(registry, names, move |registry, name| async move {
    let runner = super::connect(&registry, &name).await?;
    ServiceController::new(runner).apply(action).await?;
    Ok::<_, anyhow::Error>(action.past_tense().to_string())
  })
  .await
}
