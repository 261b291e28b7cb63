use state_machines::state_machine;

state_machine! {
    name: IngestionMachine,
    state: IngestionState,
    initial: Ready,
    states: [Ready, Authenticated, Extracted, Chunked, Indexed, Failed],
    events {
        authenticate { transition: { from: Ready, to: Authenticated } }
        extract { transition: { from: Authenticated, to: Extracted } }
        split { transition: { from: Extracted, to: Chunked } }
        index { transition: { from: Chunked, to: Indexed } }
        abort {
            transition: { from: Ready, to: Failed }
            transition: { from: Authenticated, to: Failed }
            transition: { from: Extracted, to: Failed }
            transition: { from: Chunked, to: Failed }
        }
    }
}

pub fn ready() -> IngestionMachine<(), Ready> {
    IngestionMachine::new(())
}
