/// A socket registered on the reactor. Grounded on how `neutronium::net::Endpoint`
/// registers its listener/channels on a `mio::Poll` and dispatches by token,
/// generalized from Endpoint's three hard-coded polls (`server`, `handshake`,
/// `live`) to an arbitrary set of handlers sharing one `Poll`.
pub trait IoHandler: std::any::Any {
    /// The socket to poll. Borrowed rather than owned so the reactor doesn't
    /// need to know the concrete socket type.
    fn source(&mut self) -> &mut dyn mio::Evented;

    fn interest(&self) -> mio::Ready;

    /// Called once per reactor iteration in which this handler's socket
    /// reported readiness. Takes the reactor itself (temporarily detached
    /// from its socket table for the duration of the call) so a handler can
    /// register new sockets or timers, per spec.md §4.2.
    fn on_ready(&mut self, readiness: mio::Ready, reactor: &mut crate::Reactor);

    /// Lets code outside the reactor reach a concretely-typed handler it
    /// already knows the type of (e.g. the Execution Manager pushing a new
    /// request onto a `SlaveConnHandler` it registered earlier), via
    /// `Reactor::get_handler_mut` + `downcast_mut`.
    fn as_any_mut(&mut self) -> &mut dyn std::any::Any;
}
