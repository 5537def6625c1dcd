use crate::codec::compose_field;
use crate::models::{AttributeRow, Task};
use std::collections::HashMap;

/// Folds attribute rows into one task per distinct id.
///
/// Tasks come back in the order their id was first seen.
pub fn materialize<I>(rows: I) -> Vec<Task>
where
    I: IntoIterator<Item = AttributeRow>,
{
    let mut positions: HashMap<String, usize> = HashMap::new();
    let mut tasks: Vec<Task> = Vec::new();

    for row in rows {
        let index = match positions.get(&row.id) {
            Some(&index) => index,
            None => {
                tasks.push(Task::new(row.id.clone()));
                positions.insert(row.id.clone(), tasks.len() - 1);
                tasks.len() - 1
            }
        };
        compose_field(&mut tasks[index], &row.data_type, &row.data_value);
    }

    tasks
}
