//! Vendor listing, detail, quote and watch handlers.

use gazloc_core::{format_distance, Catalog, VendorId, VendorRecord};
use gazloc_engine::{quote_order, Filters, RankedVendor};

use crate::session::{Session, Update};
use crate::ViewArgs;

/// Order line as typed on the command line.
pub(crate) struct OrderArgs<'a> {
    pub(crate) id: &'a str,
    pub(crate) brand: &'a str,
    pub(crate) bottle_type: &'a str,
    pub(crate) quantity: u32,
    pub(crate) json: bool,
}

/// Print the ranked vendor list once.
///
/// # Errors
///
/// Returns an error if the directory session has closed.
pub(crate) async fn run_vendors(
    session: &Session,
    catalog: &Catalog,
    view: &ViewArgs,
    limit: Option<usize>,
) -> anyhow::Result<()> {
    let filters = build_filters(catalog, view);
    let rows = session
        .handle
        .ranked_vendors(view.query.as_deref().unwrap_or_default(), &filters)
        .await?;
    print_view(&rows, catalog, limit);
    Ok(())
}

/// Print one vendor with every known detail.
///
/// # Errors
///
/// Returns an error if the vendor is unknown or the session has closed.
pub(crate) async fn run_show(session: &Session, catalog: &Catalog, raw_id: &str) -> anyhow::Result<()> {
    let Ok(id) = raw_id.parse::<VendorId>();
    let ranked = session.handle.select_vendor(&id).await?;
    let record = &ranked.record;

    println!("{:<12}{}", "ID", record.id);
    println!("{:<12}{}", "NAME", record.name);
    println!("{:<12}{}", "LOCATION", record.location_label.as_deref().unwrap_or(NONE));
    println!(
        "{:<12}{}",
        "COORDS",
        record.position().map_or_else(
            || NONE.to_string(),
            |p| format!("{:.5}, {:.5}", p.latitude, p.longitude)
        )
    );
    println!("{:<12}{}", "DISTANCE", distance_cell(ranked.distance_m));
    println!("{:<12}{}", "TEL", record.tel.as_deref().unwrap_or(NONE));
    println!("{:<12}{}", "EMAIL", record.email.as_deref().unwrap_or(NONE));

    let offers = offer_lines(record, catalog);
    if offers.is_empty() {
        println!("{:<12}{NONE}", "OFFERS");
    } else {
        for (i, offer) in offers.iter().enumerate() {
            let label = if i == 0 { "OFFERS" } else { "" };
            println!("{label:<12}{offer}");
        }
    }
    for (i, url) in record.image_urls.iter().enumerate() {
        let label = if i == 0 { "IMAGES" } else { "" };
        println!("{label:<12}{url}");
    }
    Ok(())
}

/// Price an order line from one vendor.
///
/// # Errors
///
/// Returns an error if the vendor is unknown, does not offer the product,
/// has no price for it, or the quantity is zero.
pub(crate) async fn run_quote(
    session: &Session,
    catalog: &Catalog,
    order: &OrderArgs<'_>,
) -> anyhow::Result<()> {
    let Ok(id) = order.id.parse::<VendorId>();
    let ranked = session.handle.select_vendor(&id).await?;
    let position = session.handle.position().await?;

    let brand = resolve_brand(catalog, order.brand);
    let bottle_type = resolve_bottle_type(catalog, order.bottle_type);
    let quote = quote_order(&ranked.record, &brand, &bottle_type, order.quantity, position)?;

    if order.json {
        println!("{}", serde_json::to_string_pretty(&quote)?);
        return Ok(());
    }

    println!("{:<12}{} ({})", "VENDOR", quote.vendor_name, quote.vendor_id);
    println!(
        "{:<12}{} {}",
        "PRODUCT",
        quote.brand,
        bottle_label(catalog, &quote.bottle_type)
    );
    println!("{:<12}{}", "QUANTITY", quote.quantity);
    println!("{:<12}{}", "UNIT PRICE", quote.unit_price);
    println!("{:<12}{}", "TOTAL", quote.total_price);
    println!("{:<12}{}", "DISTANCE", distance_cell(quote.distance_m));
    Ok(())
}

/// Print the list, then print it again on every vendor or position change
/// until Ctrl-C.
///
/// # Errors
///
/// Returns an error if the session closes underneath the watch.
pub(crate) async fn run_watch(
    mut session: Session,
    catalog: &Catalog,
    view: &ViewArgs,
) -> anyhow::Result<()> {
    let filters = build_filters(catalog, view);
    let query = view.query.clone().unwrap_or_default();

    let result = async {
        let rows = session.handle.ranked_vendors(&query, &filters).await?;
        print_view(&rows, catalog, None);

        let shutdown = shutdown_signal();
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                () = &mut shutdown => break,
                update = session.updates.recv() => match update {
                    Some(Update::VendorsChanged | Update::Moved) => {
                        let rows = session.handle.ranked_vendors(&query, &filters).await?;
                        println!();
                        print_view(&rows, catalog, None);
                    }
                    // already logged by the session's error listener
                    Some(Update::Failed(_)) => {}
                    None => break,
                },
            }
        }
        anyhow::Ok(())
    }
    .await;

    session.close().await;
    result
}

/// Resolve the command-line selection against the catalogue.
///
/// No brand and no type means the catalogue's default filter; `--all`
/// means no filter at all.
pub(crate) fn build_filters(catalog: &Catalog, view: &ViewArgs) -> Filters {
    if view.all {
        return Filters::any();
    }
    if view.brand.is_empty() && view.bottle_type.is_empty() {
        return Filters::from_catalog(catalog);
    }
    Filters::new(
        view.brand.iter().map(|b| resolve_brand(catalog, b)),
        view.bottle_type.iter().map(|t| resolve_bottle_type(catalog, t)),
    )
}

fn resolve_brand(catalog: &Catalog, raw: &str) -> String {
    catalog
        .brand(raw)
        .map_or_else(|| raw.trim().to_owned(), |b| b.name.clone())
}

/// Bottle types are stored by key; a display label is accepted too.
fn resolve_bottle_type(catalog: &Catalog, raw: &str) -> String {
    catalog
        .bottle_type(raw)
        .map_or_else(|| raw.trim().to_owned(), |t| t.key.clone())
}

fn bottle_label(catalog: &Catalog, key: &str) -> String {
    catalog
        .bottle_type(key)
        .map_or_else(|| key.to_owned(), |t| t.label.clone())
}

const NONE: &str = "\u{2014}";

fn distance_cell(distance_m: Option<f64>) -> String {
    distance_m.map_or_else(|| NONE.to_string(), format_distance)
}

fn offer_lines(record: &VendorRecord, catalog: &Catalog) -> Vec<String> {
    record
        .offered_pairs()
        .into_iter()
        .map(|(brand, kind)| {
            let price = record
                .price(brand, kind)
                .map_or_else(|| NONE.to_string(), |p| p.to_string());
            format!("{brand} {} {price}", bottle_label(catalog, kind))
        })
        .collect()
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() > max {
        format!("{}...", text.chars().take(max).collect::<String>())
    } else {
        text.to_owned()
    }
}

fn print_view(rows: &[RankedVendor], catalog: &Catalog, limit: Option<usize>) {
    if rows.is_empty() {
        println!("no vendors match; try --all or a different --query");
        return;
    }

    println!(
        "{:<6}{:<8}{:<28}{:<24}{:<10}OFFERS",
        "RANK", "ID", "NAME", "LOCATION", "DISTANCE"
    );
    let shown = limit.unwrap_or(rows.len());
    for (rank, row) in rows.iter().take(shown).enumerate() {
        let record = &row.record;
        println!(
            "{:<6}{:<8}{:<28}{:<24}{:<10}{}",
            rank + 1,
            record.id.to_string(),
            truncate(&record.name, 24),
            truncate(record.location_label.as_deref().unwrap_or(NONE), 20),
            distance_cell(row.distance_m),
            offer_lines(record, catalog).join(", ")
        );
    }
    if rows.len() > shown {
        println!("... {} more", rows.len() - shown);
    }
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %error, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    tracing::info!("received ctrl-c, closing the directory");
}
