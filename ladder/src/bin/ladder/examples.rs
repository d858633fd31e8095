use crate::commands::migrate;

#[derive(Clone, Copy)]
pub struct ExampleGroup {
    pub title: &'static str,
    pub commands: &'static [&'static str],
}

#[derive(Clone, Copy)]
pub struct CommandExample {
    pub name: &'static str,
    pub groups: &'static [ExampleGroup],
}

pub fn command_examples() -> &'static [CommandExample] {
    &[
        CommandExample {
            name: "run",
            groups: migrate::RUN_EXAMPLES,
        },
        CommandExample {
            name: "clear",
            groups: migrate::CLEAR_EXAMPLES,
        },
        CommandExample {
            name: "drop",
            groups: migrate::DROP_EXAMPLES,
        },
        CommandExample {
            name: "status",
            groups: migrate::STATUS_EXAMPLES,
        },
    ]
}
