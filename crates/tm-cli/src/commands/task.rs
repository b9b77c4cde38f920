//! Task commands.

use std::io::Write;

use tm_booking::{BookingError, Task, TaskAuthor, TaskId, TaskRepository, TaskUpdate};
use tracing::info;

use super::AppContext;
use crate::cli::TaskCommands;
use crate::error::CliError;
use crate::output::{OutputFormat, TaskList};

/// Handler for `task` subcommands.
pub struct TaskCommand<'a> {
    ctx: &'a AppContext,
}

impl<'a> TaskCommand<'a> {
    /// Creates a new task command handler.
    #[must_use]
    pub const fn new(ctx: &'a AppContext) -> Self {
        Self { ctx }
    }

    /// Executes the task command.
    ///
    /// # Errors
    ///
    /// Returns error if the command fails.
    pub async fn execute<W: Write>(
        &self,
        out: &mut W,
        format: &OutputFormat,
        command: &TaskCommands,
    ) -> Result<(), CliError> {
        let service = self.ctx.service();
        match command {
            TaskCommands::Create {
                id,
                title,
                credits,
                slots,
                location,
                category,
            } => {
                let caller = service.caller(&self.ctx.request()).await?;
                let author = TaskAuthor {
                    id: caller.user_id,
                    name: String::new(),
                    email: caller.email.unwrap_or_default(),
                };
                let mut task =
                    Task::new(TaskId::from(id.as_str()), title.clone(), author, *credits, slots.clone())?;
                task.location = location.clone().unwrap_or_default();
                task.category = category.clone().unwrap_or_default();
                service.tasks().insert_task(task.clone()).await?;
                info!(task_id = %task.id, owner = %task.author.id, "task created");
                format.write(out, &task)
            }
            TaskCommands::Show { id } => {
                let id = TaskId::from(id.as_str());
                let task = service
                    .tasks()
                    .get_task(&id)
                    .await?
                    .ok_or_else(|| BookingError::task_not_found(&id))?;
                format.write(out, &task)
            }
            TaskCommands::List => format.write(
                out,
                &TaskList {
                    tasks: service.tasks().list(),
                },
            ),
            TaskCommands::Update {
                id,
                title,
                credits,
                bookable,
                add_slots,
            } => {
                let update = TaskUpdate {
                    title: title.clone(),
                    credits: *credits,
                    is_bookable: *bookable,
                    add_slots: add_slots.clone(),
                    ..TaskUpdate::default()
                };
                let task = service
                    .update_task_as(&self.ctx.request(), &TaskId::from(id.as_str()), &update)
                    .await?;
                format.write(out, &task)
            }
        }
    }
}
