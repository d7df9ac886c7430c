use crate::api::{self, Mode};
use crate::args::{CategoriesArgs, CategoryAction};
use crate::auth::AuthGate;
use crate::commands::Out;
use crate::directory::{CategoryDirectory, MajorGroup};
use crate::model::{Category, CategoryId};
use crate::{Config, Result};

/// Lists the category directory, most used first, after applying the requested change if any.
pub async fn categories(
    config: Config,
    mode: Mode,
    args: &CategoriesArgs,
) -> Result<Out<Vec<Category>>> {
    let store = api::store(&config, mode)?;
    let mut directory = CategoryDirectory::new(store, AuthGate::new(config.token()));
    directory.load().await?;

    let done = match args.action() {
        None => None,
        Some(CategoryAction::Add { major, minor }) => {
            let added = directory.add(major, minor).await?;
            Some(format!(
                "Added {} > {}",
                added.main_category, added.sub_category
            ))
        }
        Some(CategoryAction::Rename { id, major, minor }) => {
            let renamed = directory
                .update(&CategoryId::new(id.as_str()), major, minor)
                .await?;
            Some(format!(
                "Renamed {id} to {} > {}",
                renamed.main_category, renamed.sub_category
            ))
        }
        Some(CategoryAction::Delete { id }) => {
            directory.delete(&CategoryId::new(id.as_str())).await?;
            Some(format!("Deleted {id}"))
        }
    };

    let mut message = done.map(|d| format!("{d}\n")).unwrap_or_default();
    if directory.groups().is_empty() {
        message.push_str("No categories");
    } else {
        message.push_str(&render(directory.groups()));
    }
    Ok(Out::new(message, directory.categories().to_vec()))
}

fn render(groups: &[MajorGroup]) -> String {
    groups
        .iter()
        .map(|group| {
            let minors: Vec<String> = group
                .minors
                .iter()
                .map(|c| format!("{} ({})", c.sub_category, c.count))
                .collect();
            format!("{} ({}): {}", group.name, group.count, minors.join(", "))
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::TestEnv;

    #[tokio::test]
    async fn test_categories_ranked() {
        let env = TestEnv::new().await;
        let out = categories(env.config(), Mode::Test, &CategoriesArgs::new(None))
            .await
            .unwrap();
        let lines: Vec<&str> = out.message().lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "Food (26): Groceries (12), Cafe (7), Delivery (7)");
        assert!(lines[1].starts_with("Transport (8)"));
        assert!(lines[2].starts_with("Home (6)"));
    }

    #[tokio::test]
    async fn test_categories_add_and_reject_duplicate() {
        let env = TestEnv::new().await;
        let add = CategoriesArgs::new(Some(CategoryAction::Add {
            major: "Health".into(),
            minor: "Pharmacy".into(),
        }));
        let out = categories(env.config(), Mode::Test, &add).await.unwrap();
        assert!(out.message().starts_with("Added Health > Pharmacy"));
        assert_eq!(out.structure().unwrap().len(), 8);

        let duplicate = CategoriesArgs::new(Some(CategoryAction::Add {
            major: "Food".into(),
            minor: "Cafe".into(),
        }));
        assert!(categories(env.config(), Mode::Test, &duplicate)
            .await
            .is_err());
    }
}
