use std::time::Duration;

use camino::Utf8Path;
use decima_emulator::{
    inspect, load,
    loader::InMemoryFilesystem,
    process::ProcessTable,
    runtime::{Interrupt, MachineError, Mode},
    Machine, MachineConfig,
};
use indoc::indoc;
use pretty_assertions::assert_eq;

const STACK: i64 = 30;

fn config(cycle_delay: Duration, cycle_limit: usize) -> MachineConfig {
    MachineConfig {
        tick_unit: Duration::from_millis(1),
        timer_idle: Duration::from_millis(1),
        dma_latency: Duration::from_millis(1),
        cycle_delay,
        cycle_limit: Some(cycle_limit),
    }
}

/// Load a program at the first free address and dispatch it in user mode
fn boot(source: &str, config: MachineConfig) -> Machine {
    let fs: InMemoryFilesystem = [("prog.txt", source)].into_iter().collect();
    let path = Utf8Path::new("prog.txt");

    let header = inspect(&fs, path).unwrap();
    let mut table = ProcessTable::new();
    let base = table.next_free(header.size() + STACK).unwrap();
    let pcb = table.admit(&header, base, STACK).unwrap().clone();

    let machine = Machine::new(config);
    machine.with_computer(|computer| {
        load(&fs, path, &mut computer.memory, pcb.base).unwrap();
        computer.dispatch(&pcb, Mode::User);
    });
    machine
}

#[test]
fn dma_read_test() {
    let machine = boot(
        indoc! {"
            .name poll
            28100001   # sdmap  #1
            29100002   # sdmac  #2
            30100003   # sdmas  #3
            31100000   # sdmaio #0, read
            32100331   # sdmam  #331
            33000000   # sdmaon
            04000031   # load   [31]
            08100000   # comp   #0
            09000006   # jmpe   6
            04100000   # load   #0
            13000000   # svc
        "},
        config(Duration::from_micros(50), 100_000),
    );
    machine.with_computer(|computer| {
        computer.disk.sector_mut(1, 2, 3).unwrap().store(777);
    });

    let report = machine.run().unwrap();

    assert!(!report.limit_reached);
    assert_eq!(report.fault(), None);
    assert!(report.interrupts.contains(&Interrupt::IoCompletion));
    assert_eq!(report.interrupts.last(), Some(&Interrupt::Syscall));
    machine.with_computer(|computer| {
        assert_eq!(computer.memory.get(331), Ok(777));
        assert!(!computer.running);
        assert!(!computer.dma.is_active());
    });
}

#[test]
fn dma_write_test() {
    let machine = boot(
        indoc! {"
            04101234   # load   #1234
            05000020   # str    [20]
            28100009   # sdmap  #9
            29100009   # sdmac  #9
            30100099   # sdmas  #99
            31100001   # sdmaio #1, write
            32100320   # sdmam  #320
            33000000   # sdmaon
            27000008   # j      8
        "},
        config(Duration::from_millis(1), 300),
    );

    let report = machine.run().unwrap();

    assert!(report.limit_reached);
    assert!(report.interrupts.contains(&Interrupt::IoCompletion));
    machine.with_computer(|computer| {
        let sector = computer.disk.sector(9, 9, 99).unwrap();
        assert_eq!(sector.text(), "1234");
    });
}

#[test]
fn timer_test() {
    let machine = boot(
        indoc! {"
            17100001   # tti #1
            27000001   # j   1
        "},
        config(Duration::from_millis(1), 200),
    );

    let report = machine.run().unwrap();

    assert!(report.limit_reached);
    assert!(report.interrupts.contains(&Interrupt::Clock));
    assert_eq!(report.fault(), None);
}

#[test]
fn fatal_interrupt_test() {
    let machine = boot(
        indoc! {"
            04100007   # load #7
            03100000   # div  #0
            13000000   # svc
        "},
        config(Duration::ZERO, 1000),
    );

    let report = machine.run().unwrap();

    assert_eq!(report.cycles, 2);
    assert_eq!(report.fault(), Some(Interrupt::Overflow));
    machine.with_computer(|computer| {
        assert_eq!(computer.registers.ac, 7);
        assert!(!computer.running);
    });
}

#[test]
fn not_dispatched_test() {
    let machine = Machine::new(MachineConfig::default());
    assert!(matches!(machine.run(), Err(MachineError::NotDispatched)));
}
