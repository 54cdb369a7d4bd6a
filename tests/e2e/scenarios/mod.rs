mod command_gate;
mod crash_recovery;
mod happy_path;
mod read_your_writes;
mod rejection;
mod search;
mod state_transitions;
