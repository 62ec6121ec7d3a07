use parking_lot::{Condvar, Mutex};

#[derive(Debug, Default)]
struct Tickets {
    next: u64,
    serving: u64,
}

/// Admits one caller at a time, in arrival order.
///
/// Each caller draws a ticket and waits until it is served. Dropping the [`GatePass`]
/// serves the next ticket.
#[derive(Debug, Default)]
pub struct Gate {
    tickets: Mutex<Tickets>,
    turn: Condvar,
}

impl Gate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Blocks until every earlier caller has left.
    pub fn enter(&self) -> GatePass<'_> {
        let mut tickets = self.tickets.lock();
        let ticket = tickets.next;
        tickets.next += 1;
        while tickets.serving != ticket {
            self.turn.wait(&mut tickets);
        }
        GatePass { gate: self }
    }

    #[cfg(test)]
    fn waiting(&self) -> u64 {
        let tickets = self.tickets.lock();
        (tickets.next - tickets.serving).saturating_sub(1)
    }
}

#[must_use]
pub struct GatePass<'g> {
    gate: &'g Gate,
}

impl Drop for GatePass<'_> {
    fn drop(&mut self) {
        let mut tickets = self.gate.tickets.lock();
        tickets.serving += 1;
        self.gate.turn.notify_all();
    }
}
