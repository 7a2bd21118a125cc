//! Item command handlers

use std::path::Path;

use anyhow::{bail, Context, Result};

use fabedit_core::validation::issues_for;
use fabedit_core::{
    CatalogStore, Config, DecoderRegistry, EntityDraft, Filters, Settings, SortKey, Template,
    TemplateKind,
};

use crate::commands::catalog::{open_session, save_catalog};
use crate::output::{Output, OutputFormat};
use crate::prompt::confirm;

/// Filters for `list`
#[derive(Debug, Default)]
pub struct ListArgs {
    pub item_class: Option<String>,
    pub search: Option<String>,
    pub tag: Option<String>,
    pub sort: String,
}

impl ListArgs {
    fn to_filters(&self) -> Result<Filters> {
        let sort: SortKey = self.sort.parse().map_err(anyhow::Error::msg)?;
        let mut filters = Filters::new().sorted_by(sort);
        if let Some(item_class) = &self.item_class {
            filters = filters.with_type(item_class.clone());
        }
        if let Some(search) = &self.search {
            filters = filters.with_search(search.clone());
        }
        if let Some(tag) = &self.tag {
            filters = filters.with_tag(tag.clone());
        }
        Ok(filters)
    }
}

/// Options for `create`
#[derive(Debug, Default)]
pub struct CreateArgs {
    pub class: Option<String>,
    pub id: Option<String>,
    pub name: Option<String>,
    pub template: Option<String>,
    pub tags: Vec<String>,
}

/// List unassigned items
pub fn list(file: &Path, args: ListArgs, config: &Config, output: &Output) -> Result<()> {
    let session = open_session(file, config)?;
    let filters = args.to_filters()?;

    let entities = session.store().filtered_sorted(&filters);
    output.print_entities(&entities);
    Ok(())
}

/// Show a single item
pub fn show(file: &Path, id: &str, config: &Config, output: &Output) -> Result<()> {
    let session = open_session(file, config)?;
    let store = session.store();

    let entity = store
        .get(id)
        .with_context(|| format!("Item not found: {}", id))?;
    let info = DecoderRegistry::default().decode(entity);
    let bundles = containing_bundles(store, id);

    output.print_entity(entity, &info, &bundles);

    if output.format == OutputFormat::Human {
        let issues = issues_for(store, id);
        if !issues.is_empty() {
            println!();
            println!("── Issues ──");
            for issue in issues {
                println!("[{}] {}", issue.severity, issue.message);
            }
        }
    }
    Ok(())
}

/// Print the next free id for a class
pub fn next_id(file: &Path, item_class: &str, config: &Config, output: &Output) -> Result<()> {
    let session = open_session(file, config)?;
    let item_id = session.generate_item_id(item_class);

    match output.format {
        OutputFormat::Json => output.print_json(&serde_json::json!({
            "itemClass": item_class,
            "itemId": item_id,
        })),
        _ => println!("{}", item_id),
    }
    Ok(())
}

/// Create a new item, optionally from a template
pub fn create(file: &Path, args: CreateArgs, config: &Config, output: &Output) -> Result<()> {
    let mut session = open_session(file, config)?;

    let template = match &args.template {
        Some(template_id) => {
            let settings = Settings::load_from_path(&config.settings_path())?;
            Some(find_template(&settings, template_id)?)
        }
        None => None,
    };

    let item_class = match (args.class, &template) {
        (Some(class), _) => class,
        (None, Some(Template::Item(t))) => t.item_class.clone(),
        (None, Some(Template::Bundle(t))) => t.bundle_class.clone(),
        (None, None) => bail!("An item class is required when no template is given"),
    };

    let item_id = match args.id {
        Some(id) => id,
        None => session.generate_item_id(&item_class),
    };
    if session.store().get(&item_id).is_some() {
        bail!("Item already exists: {}", item_id);
    }

    let mut draft = match &template {
        Some(Template::Item(t)) => t.to_draft(item_id),
        Some(Template::Bundle(t)) => t.to_draft(item_id),
        None => EntityDraft::new(item_id, item_class.clone()),
    };
    draft.item_class = item_class;
    if let Some(name) = args.name {
        draft.display_name = Some(name);
    }
    if !args.tags.is_empty() {
        let mut tags = draft.tags.take().unwrap_or_default();
        for tag in args.tags {
            if !tags.contains(&tag) {
                tags.push(tag);
            }
        }
        draft.tags = Some(tags);
    }

    let entity = session.create_entity(draft);
    save_catalog(&session, file)?;

    output.success(&format!("Created {}: {}", entity.item_class(), entity.item_id()));
    let info = DecoderRegistry::default().decode(&entity);
    output.print_entity(&entity, &info, &[]);
    Ok(())
}

/// Delete an item, removing it from every bundle
pub fn delete(file: &Path, id: &str, yes: bool, config: &Config, output: &Output) -> Result<()> {
    let mut session = open_session(file, config)?;

    let entity = session
        .store()
        .get(id)
        .with_context(|| format!("Item not found: {}", id))?;

    // Confirm deletion
    if !yes && output.should_prompt() {
        println!(
            "Delete item: {} - {}",
            entity.item_id(),
            entity.display_name().unwrap_or("")
        );
        let bundles = containing_bundles(session.store(), id);
        if !bundles.is_empty() {
            println!("It will be removed from: {}", bundles.join(", "));
        }
        if !confirm("Are you sure?")? {
            println!("Cancelled.");
            return Ok(());
        }
    }

    session.delete_entity(id);
    save_catalog(&session, file)?;

    output.success(&format!("Deleted item: {}", id));
    Ok(())
}

/// Look up a template id among item templates, then bundle templates
pub(crate) fn find_template(settings: &Settings, template_id: &str) -> Result<Template> {
    settings
        .template(TemplateKind::Item, template_id)
        .or_else(|| settings.template(TemplateKind::Bundle, template_id))
        .with_context(|| format!("Template not found: {}", template_id))
}

/// Ids of the bundles listing `item_id`
pub(crate) fn containing_bundles<'a>(store: &'a CatalogStore, item_id: &str) -> Vec<&'a str> {
    store
        .bundles()
        .into_iter()
        .filter(|bundle| bundle.has_member(item_id))
        .map(|bundle| bundle.item_id())
        .collect()
}
