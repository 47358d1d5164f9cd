use tracing::{debug, trace};

use super::{interrupt::Interrupt, machine::Shared};

/// Body of the timer unit thread
///
/// While the period is zero the timer idles. Otherwise it waits
/// `period × tick_unit` and raises a clock interrupt, dropped if another one
/// is already pending.
pub(crate) fn run(shared: &Shared) {
    debug!("Timer unit started");
    let mut computer = shared.lock();

    while computer.running {
        let period = computer.timer_period;
        let armed = period > 0;
        let delay = if armed {
            shared
                .config
                .tick_unit
                .saturating_mul(period.unsigned_abs())
        } else {
            shared.config.timer_idle
        };

        computer = shared.pause(computer, delay);

        // The period may have been reset while waiting
        if armed && computer.running && computer.timer_period > 0 {
            trace!(period, "Clock tick");
            computer.raise(Interrupt::Clock);
        }
    }

    debug!("Timer unit stopped");
}
