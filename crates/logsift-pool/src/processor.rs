/// Entry point a processor exposes by name
pub type EntryPoint<P> =
    fn(&mut P, &<P as Processor>::Item) -> anyhow::Result<<P as Processor>::Output>;

/// Per-worker processing state
///
/// Each worker builds its own instance from the factory handed to
/// [`collate`](crate::collate) and never shares it.
pub trait Processor {
    /// Work item the entry points accept
    type Item;

    /// Value a successful invocation produces
    type Output;

    /// Resolve an entry point by name
    ///
    /// `None` means the processor has no such operation; the worker asking
    /// for it stops taking work.
    fn entry_point(&self, name: &str) -> Option<EntryPoint<Self>>;
}
