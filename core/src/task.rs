use async_trait::async_trait;

/// The contract for one step of a task chain.
///
/// A `Task<T>` receives the previous step's result (`None` for the first step)
/// and produces the next one. Closures work too; implement this trait when a
/// step carries its own configuration or resources.
///
/// # Example
/// ```rust,ignore
/// #[derive(Clone)]
/// struct Double;
///
/// #[async_trait]
/// impl Task<u64> for Double {
///     type Error = String;
///
///     async fn run(&self, previous: Option<u64>) -> Result<u64, Self::Error> {
///         previous.map(|v| v * 2).ok_or_else(|| "nothing to double".to_string())
///     }
/// }
/// ```
#[async_trait]
pub trait Task<T>: Send + Sync + 'static
where
    T: Send + 'static,
{
    type Error: Send + Sync + 'static;

    async fn run(&self, previous: Option<T>) -> Result<T, Self::Error>;
}
