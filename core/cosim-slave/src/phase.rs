/// Slave Agent state machine (spec.md §4.5).
///
/// ```text
///  Connected ──HELLO──► Handshook ──SETUP──► Ready
///    Ready ──SET_VARS──► Ready              (apply, maintain)
///    Ready ──STEP──► Stepping ──done──► Stepped
///    Stepped ──ACCEPT_STEP──► Ready
///    any ──TERMINATE──► Terminated
/// ```
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum SlavePhase {
    Connected,
    Handshook,
    Ready,
    Stepping,
    Stepped,
    Terminated,
}

impl SlavePhase {
    pub fn accepts_set_vars(self) -> bool {
        matches!(self, SlavePhase::Ready)
    }

    pub fn accepts_step(self) -> bool {
        matches!(self, SlavePhase::Ready)
    }

    pub fn accepts_accept_step(self) -> bool {
        matches!(self, SlavePhase::Stepped)
    }

    pub fn accepts_setup(self) -> bool {
        matches!(self, SlavePhase::Handshook)
    }

    pub fn accepts_hello(self) -> bool {
        matches!(self, SlavePhase::Connected)
    }
}
