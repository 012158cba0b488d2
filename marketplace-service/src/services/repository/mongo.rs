use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::{
    bson::{doc, Bson, DateTime, Document},
    options::{FindOptions, IndexOptions},
    Collection, Database, IndexModel,
};
use service_core::error::{is_duplicate_key, AppError};

use super::{FeedbackFilter, LedgerTotals, Page, RatingTotals, Repository, TransactionFilter};
use crate::models::{
    Booking, BookingStatus, Coupon, Feedback, PaymentMethod, PaymentStatus, Service,
    ServiceFeedbackEntry, Transaction, TransactionStatus, User,
};

#[derive(Clone)]
pub struct MongoRepository {
    db: Database,
    users: Collection<User>,
    services: Collection<Service>,
    bookings: Collection<Booking>,
    transactions: Collection<Transaction>,
    feedbacks: Collection<Feedback>,
    coupons: Collection<Coupon>,
}

impl MongoRepository {
    pub fn new(db: &Database) -> Self {
        Self {
            db: db.clone(),
            users: db.collection("users"),
            services: db.collection("services"),
            bookings: db.collection("bookings"),
            transactions: db.collection("transactions"),
            feedbacks: db.collection("feedbacks"),
            coupons: db.collection("coupons"),
        }
    }

    /// Sets `completed` on the row matched by `filter`; the partial unique
    /// index turns a second completed payment for a booking into `Conflict`.
    async fn mark_completed(
        &self,
        filter: Document,
        payment_id: Option<&str>,
        signature: Option<&str>,
    ) -> Result<bool, AppError> {
        let mut set = doc! {
            "status": TransactionStatus::Completed.as_str(),
            "updated_at": DateTime::now(),
        };
        if let Some(payment_id) = payment_id {
            set.insert("razorpay_payment_id", payment_id);
        }
        if let Some(signature) = signature {
            set.insert("razorpay_signature", signature);
        }

        let result = self
            .transactions
            .update_one(filter, doc! { "$set": set }, None)
            .await
            .map_err(|e| map_duplicate(e, "Booking already has a completed payment"))?;
        Ok(result.matched_count > 0)
    }
}

fn named_index(keys: Document, name: &str) -> IndexModel {
    IndexModel::builder()
        .keys(keys)
        .options(IndexOptions::builder().name(name.to_string()).build())
        .build()
}

fn unique_index(keys: Document, name: &str, partial: Option<Document>) -> IndexModel {
    let options = match partial {
        Some(partial) => IndexOptions::builder()
            .name(name.to_string())
            .unique(true)
            .partial_filter_expression(partial)
            .build(),
        None => IndexOptions::builder()
            .name(name.to_string())
            .unique(true)
            .build(),
    };
    IndexModel::builder().keys(keys).options(options).build()
}

/// `$sum` yields Int32, Int64 or Double depending on the inputs.
fn bson_i64(value: Option<&Bson>) -> i64 {
    match value {
        Some(Bson::Int32(v)) => i64::from(*v),
        Some(Bson::Int64(v)) => *v,
        Some(Bson::Double(v)) => *v as i64,
        _ => 0,
    }
}

fn map_duplicate(err: mongodb::error::Error, message: &str) -> AppError {
    if is_duplicate_key(&err) {
        AppError::conflict(message)
    } else {
        err.into()
    }
}

fn transaction_filter_doc(filter: &TransactionFilter) -> Document {
    let mut query = Document::new();
    if let Some(ref customer_id) = filter.customer_id {
        query.insert("customer_id", customer_id.as_str());
    }
    if let Some(ref provider_id) = filter.provider_id {
        query.insert("provider_id", provider_id.as_str());
    }
    if let Some(ref booking_id) = filter.booking_id {
        query.insert("booking_id", booking_id.as_str());
    }
    if let Some(status) = filter.status {
        query.insert("status", status.as_str());
    }
    if let Some(method) = filter.payment_method {
        query.insert("payment_method", method.as_str());
    }
    query
}

fn feedback_filter_doc(filter: &FeedbackFilter) -> Document {
    let mut query = Document::new();
    if let Some(ref customer_id) = filter.customer_id {
        query.insert("customer_id", customer_id.as_str());
    }
    if let Some(ref provider_id) = filter.provider_id {
        query.insert("provider_feedback.provider_id", provider_id.as_str());
    }
    if let Some(ref service_id) = filter.service_id {
        query.insert("service_feedback.service_id", service_id.as_str());
    }
    if let Some(rating) = filter.rating {
        query.insert(
            "$or",
            vec![
                doc! { "provider_feedback.rating": rating },
                doc! { "service_feedback.rating": rating },
            ],
        );
    }
    query
}

fn newest_first(page: Page) -> FindOptions {
    FindOptions::builder()
        .sort(doc! { "created_at": -1, "_id": -1 })
        .skip(page.skip)
        .limit(page.limit)
        .build()
}

#[async_trait]
impl Repository for MongoRepository {
    async fn init_indexes(&self) -> Result<(), AppError> {
        // At most one completed payment per booking. Withdrawals carry no
        // booking_id and are outside the index.
        self.transactions
            .create_indexes(
                [
                    unique_index(
                        doc! { "booking_id": 1 },
                        "completed_payment_per_booking_idx",
                        Some(doc! {
                            "status": TransactionStatus::Completed.as_str(),
                            "booking_id": { "$exists": true },
                        }),
                    ),
                    named_index(doc! { "razorpay_order_id": 1 }, "razorpay_order_idx"),
                    named_index(
                        doc! { "provider_id": 1, "status": 1, "payment_method": 1 },
                        "provider_ledger_idx",
                    ),
                    named_index(
                        doc! { "customer_id": 1, "created_at": -1 },
                        "customer_history_idx",
                    ),
                ],
                None,
            )
            .await?;

        self.feedbacks
            .create_indexes(
                [
                    unique_index(doc! { "booking_id": 1 }, "feedback_per_booking_idx", None),
                    named_index(
                        doc! { "provider_feedback.provider_id": 1 },
                        "feedback_provider_idx",
                    ),
                    named_index(
                        doc! { "service_feedback.service_id": 1 },
                        "feedback_service_idx",
                    ),
                    named_index(doc! { "customer_id": 1 }, "feedback_customer_idx"),
                ],
                None,
            )
            .await?;

        self.coupons
            .create_indexes([unique_index(doc! { "code": 1 }, "coupon_code_idx", None)], None)
            .await?;

        self.bookings
            .create_indexes(
                [named_index(
                    doc! { "customer_id": 1, "payment_status": 1 },
                    "booking_customer_idx",
                )],
                None,
            )
            .await?;

        tracing::info!("Marketplace indexes initialized");
        Ok(())
    }

    async fn health_check(&self) -> Result<(), AppError> {
        self.db.run_command(doc! { "ping": 1 }, None).await?;
        Ok(())
    }

    async fn insert_user(&self, user: User) -> Result<(), AppError> {
        self.users
            .insert_one(user, None)
            .await
            .map_err(|e| map_duplicate(e, "User already exists"))?;
        Ok(())
    }

    async fn get_user(&self, id: &str) -> Result<Option<User>, AppError> {
        Ok(self.users.find_one(doc! { "_id": id }, None).await?)
    }

    async fn debit_wallet(&self, user_id: &str, amount: i64) -> Result<bool, AppError> {
        let result = self
            .users
            .update_one(
                doc! { "_id": user_id, "wallet_balance": { "$gte": amount } },
                doc! { "$inc": { "wallet_balance": -amount } },
                None,
            )
            .await?;
        Ok(result.matched_count > 0)
    }

    async fn credit_wallet(&self, user_id: &str, amount: i64) -> Result<bool, AppError> {
        let result = self
            .users
            .update_one(
                doc! { "_id": user_id },
                doc! { "$inc": { "wallet_balance": amount } },
                None,
            )
            .await?;
        Ok(result.matched_count > 0)
    }

    async fn add_provider_feedback(
        &self,
        provider_id: &str,
        feedback_id: &str,
    ) -> Result<(), AppError> {
        self.users
            .update_one(
                doc! { "_id": provider_id },
                doc! { "$addToSet": { "feedbacks": feedback_id } },
                None,
            )
            .await?;
        Ok(())
    }

    async fn remove_provider_feedback(
        &self,
        provider_id: &str,
        feedback_id: &str,
    ) -> Result<(), AppError> {
        self.users
            .update_one(
                doc! { "_id": provider_id },
                doc! { "$pull": { "feedbacks": feedback_id } },
                None,
            )
            .await?;
        Ok(())
    }

    async fn insert_service(&self, service: Service) -> Result<(), AppError> {
        self.services.insert_one(service, None).await?;
        Ok(())
    }

    async fn get_service(&self, id: &str) -> Result<Option<Service>, AppError> {
        Ok(self.services.find_one(doc! { "_id": id }, None).await?)
    }

    async fn list_services(&self, active_only: bool) -> Result<Vec<Service>, AppError> {
        let filter = if active_only {
            doc! { "is_active": true }
        } else {
            Document::new()
        };
        let options = FindOptions::builder().sort(doc! { "name": 1 }).build();
        let cursor = self.services.find(filter, options).await?;
        Ok(cursor.try_collect().await?)
    }

    async fn push_service_feedback(
        &self,
        service_id: &str,
        entry: ServiceFeedbackEntry,
    ) -> Result<bool, AppError> {
        let rating = i64::from(entry.rating);
        let entry = mongodb::bson::to_bson(&entry)?;
        let result = self
            .services
            .update_one(
                doc! { "_id": service_id },
                doc! {
                    "$push": { "feedback": entry },
                    "$inc": { "rating_sum": rating, "rating_count": 1_i64 },
                    "$set": { "updated_at": DateTime::now() },
                },
                None,
            )
            .await?;
        Ok(result.matched_count > 0)
    }

    async fn update_service_feedback(
        &self,
        service_id: &str,
        feedback_id: &str,
        old_rating: i32,
        new_rating: i32,
        comment: &str,
    ) -> Result<bool, AppError> {
        let result = self
            .services
            .update_one(
                doc! {
                    "_id": service_id,
                    "feedback": { "$elemMatch": { "feedback_id": feedback_id, "rating": old_rating } },
                },
                doc! {
                    "$set": {
                        "feedback.$.rating": new_rating,
                        "feedback.$.comment": comment,
                        "updated_at": DateTime::now(),
                    },
                    "$inc": { "rating_sum": i64::from(new_rating - old_rating) },
                },
                None,
            )
            .await?;
        Ok(result.matched_count > 0)
    }

    async fn pull_service_feedback(
        &self,
        service_id: &str,
        feedback_id: &str,
        rating: i32,
    ) -> Result<bool, AppError> {
        let result = self
            .services
            .update_one(
                doc! { "_id": service_id, "feedback.feedback_id": feedback_id },
                doc! {
                    "$pull": { "feedback": { "feedback_id": feedback_id } },
                    "$inc": { "rating_sum": -i64::from(rating), "rating_count": -1_i64 },
                    "$set": { "updated_at": DateTime::now() },
                },
                None,
            )
            .await?;
        Ok(result.matched_count > 0)
    }

    async fn insert_booking(&self, booking: Booking) -> Result<(), AppError> {
        self.bookings.insert_one(booking, None).await?;
        Ok(())
    }

    async fn get_booking(&self, id: &str) -> Result<Option<Booking>, AppError> {
        Ok(self.bookings.find_one(doc! { "_id": id }, None).await?)
    }

    async fn set_booking_payment_status(
        &self,
        id: &str,
        from: PaymentStatus,
        to: PaymentStatus,
    ) -> Result<bool, AppError> {
        let result = self
            .bookings
            .update_one(
                doc! { "_id": id, "payment_status": from.as_str() },
                doc! { "$set": { "payment_status": to.as_str(), "updated_at": DateTime::now() } },
                None,
            )
            .await?;
        Ok(result.matched_count > 0)
    }

    async fn set_booking_status(
        &self,
        id: &str,
        from: BookingStatus,
        to: BookingStatus,
    ) -> Result<bool, AppError> {
        let result = self
            .bookings
            .update_one(
                doc! { "_id": id, "status": from.as_str() },
                doc! { "$set": { "status": to.as_str(), "updated_at": DateTime::now() } },
                None,
            )
            .await?;
        Ok(result.matched_count > 0)
    }

    async fn attach_booking_feedback(
        &self,
        booking_id: &str,
        feedback_id: &str,
    ) -> Result<bool, AppError> {
        let result = self
            .bookings
            .update_one(
                doc! { "_id": booking_id, "feedback_id": Bson::Null },
                doc! { "$set": { "feedback_id": feedback_id, "updated_at": DateTime::now() } },
                None,
            )
            .await?;
        Ok(result.matched_count > 0)
    }

    async fn detach_booking_feedback(
        &self,
        booking_id: &str,
        feedback_id: &str,
    ) -> Result<(), AppError> {
        self.bookings
            .update_one(
                doc! { "_id": booking_id, "feedback_id": feedback_id },
                doc! {
                    "$unset": { "feedback_id": "" },
                    "$set": { "updated_at": DateTime::now() },
                },
                None,
            )
            .await?;
        Ok(())
    }

    async fn count_paid_bookings(&self, customer_id: &str) -> Result<u64, AppError> {
        Ok(self
            .bookings
            .count_documents(
                doc! {
                    "customer_id": customer_id,
                    "payment_status": PaymentStatus::Paid.as_str(),
                },
                None,
            )
            .await?)
    }

    async fn insert_transaction(&self, tx: Transaction) -> Result<(), AppError> {
        self.transactions
            .insert_one(tx, None)
            .await
            .map_err(|e| map_duplicate(e, "Booking already has a completed payment"))?;
        Ok(())
    }

    async fn get_transaction(&self, id: &str) -> Result<Option<Transaction>, AppError> {
        Ok(self.transactions.find_one(doc! { "_id": id }, None).await?)
    }

    async fn find_transaction_by_order(
        &self,
        order_id: &str,
    ) -> Result<Option<Transaction>, AppError> {
        Ok(self
            .transactions
            .find_one(doc! { "razorpay_order_id": order_id }, None)
            .await?)
    }

    async fn complete_transaction(
        &self,
        id: &str,
        payment_id: Option<&str>,
        signature: Option<&str>,
    ) -> Result<bool, AppError> {
        self.mark_completed(
            doc! { "_id": id, "status": TransactionStatus::Pending.as_str() },
            payment_id,
            signature,
        )
        .await
    }

    async fn capture_transaction(
        &self,
        id: &str,
        payment_id: Option<&str>,
        signature: Option<&str>,
    ) -> Result<bool, AppError> {
        self.mark_completed(
            doc! { "_id": id, "status": { "$in": [
                TransactionStatus::Pending.as_str(),
                TransactionStatus::Failed.as_str(),
            ] } },
            payment_id,
            signature,
        )
        .await
    }

    async fn fail_transaction(&self, id: &str) -> Result<bool, AppError> {
        let result = self
            .transactions
            .update_one(
                doc! { "_id": id, "status": TransactionStatus::Pending.as_str() },
                doc! { "$set": {
                    "status": TransactionStatus::Failed.as_str(),
                    "updated_at": DateTime::now(),
                } },
                None,
            )
            .await?;
        Ok(result.matched_count > 0)
    }

    async fn list_transactions(
        &self,
        filter: &TransactionFilter,
        page: Page,
    ) -> Result<(Vec<Transaction>, u64), AppError> {
        let query = transaction_filter_doc(filter);
        let total = self
            .transactions
            .count_documents(query.clone(), None)
            .await?;
        let cursor = self.transactions.find(query, newest_first(page)).await?;
        Ok((cursor.try_collect().await?, total))
    }

    async fn ledger_totals(&self, provider_id: &str) -> Result<LedgerTotals, AppError> {
        let pipeline = vec![
            doc! { "$match": {
                "provider_id": provider_id,
                "status": { "$in": [
                    TransactionStatus::Completed.as_str(),
                    TransactionStatus::Pending.as_str(),
                ] },
            } },
            doc! { "$group": {
                "_id": { "method": "$payment_method", "status": "$status" },
                "provider_total": { "$sum": "$provider_amount" },
                "amount_total": { "$sum": "$amount" },
            } },
        ];

        let mut cursor = self.transactions.aggregate(pipeline, None).await?;
        let mut totals = LedgerTotals::default();

        while let Some(row) = cursor.try_next().await? {
            let Ok(key) = row.get_document("_id") else {
                continue;
            };
            let is_withdrawal =
                key.get_str("method").ok() == Some(PaymentMethod::Withdrawal.as_str());
            let status = key.get_str("status").unwrap_or_default();

            match (is_withdrawal, status) {
                (false, "completed") => {
                    totals.earned = totals
                        .earned
                        .saturating_add(bson_i64(row.get("provider_total")))
                }
                (true, "completed") => {
                    totals.withdrawn = totals
                        .withdrawn
                        .saturating_add(bson_i64(row.get("amount_total")))
                }
                (true, "pending") => {
                    totals.held = totals
                        .held
                        .saturating_add(bson_i64(row.get("amount_total")))
                }
                _ => {}
            }
        }

        Ok(totals)
    }

    async fn insert_feedback(&self, feedback: Feedback) -> Result<(), AppError> {
        self.feedbacks
            .insert_one(feedback, None)
            .await
            .map_err(|e| map_duplicate(e, "Feedback already submitted for this booking"))?;
        Ok(())
    }

    async fn get_feedback(&self, id: &str) -> Result<Option<Feedback>, AppError> {
        Ok(self.feedbacks.find_one(doc! { "_id": id }, None).await?)
    }

    async fn replace_feedback(&self, feedback: &Feedback) -> Result<bool, AppError> {
        let result = self
            .feedbacks
            .replace_one(doc! { "_id": feedback.id.as_str() }, feedback, None)
            .await?;
        Ok(result.matched_count > 0)
    }

    async fn delete_feedback(&self, id: &str) -> Result<bool, AppError> {
        let result = self.feedbacks.delete_one(doc! { "_id": id }, None).await?;
        Ok(result.deleted_count > 0)
    }

    async fn list_feedback(
        &self,
        filter: &FeedbackFilter,
        page: Page,
    ) -> Result<(Vec<Feedback>, u64), AppError> {
        let query = feedback_filter_doc(filter);
        let total = self.feedbacks.count_documents(query.clone(), None).await?;
        let cursor = self.feedbacks.find(query, newest_first(page)).await?;
        Ok((cursor.try_collect().await?, total))
    }

    async fn provider_rating(&self, provider_id: &str) -> Result<RatingTotals, AppError> {
        let pipeline = vec![
            doc! { "$match": { "provider_feedback.provider_id": provider_id } },
            doc! { "$group": {
                "_id": Bson::Null,
                "sum": { "$sum": "$provider_feedback.rating" },
                "count": { "$sum": 1 },
            } },
        ];

        let mut cursor = self.feedbacks.aggregate(pipeline, None).await?;
        match cursor.try_next().await? {
            Some(row) => Ok(RatingTotals {
                sum: bson_i64(row.get("sum")),
                count: bson_i64(row.get("count")),
            }),
            None => Ok(RatingTotals::default()),
        }
    }

    async fn insert_coupon(&self, coupon: Coupon) -> Result<(), AppError> {
        self.coupons
            .insert_one(coupon, None)
            .await
            .map_err(|e| map_duplicate(e, "Coupon code already exists"))?;
        Ok(())
    }

    async fn get_coupon(&self, id: &str) -> Result<Option<Coupon>, AppError> {
        Ok(self.coupons.find_one(doc! { "_id": id }, None).await?)
    }

    async fn find_coupon_by_code(&self, code: &str) -> Result<Option<Coupon>, AppError> {
        Ok(self.coupons.find_one(doc! { "code": code }, None).await?)
    }

    async fn replace_coupon(&self, coupon: &Coupon) -> Result<bool, AppError> {
        let result = self
            .coupons
            .replace_one(doc! { "_id": coupon.id.as_str() }, coupon, None)
            .await
            .map_err(|e| map_duplicate(e, "Coupon code already exists"))?;
        Ok(result.matched_count > 0)
    }

    async fn delete_coupon(&self, id: &str) -> Result<bool, AppError> {
        let result = self.coupons.delete_one(doc! { "_id": id }, None).await?;
        Ok(result.deleted_count > 0)
    }

    async fn list_coupons(&self) -> Result<Vec<Coupon>, AppError> {
        let options = FindOptions::builder().sort(doc! { "created_at": -1 }).build();
        let cursor = self.coupons.find(Document::new(), options).await?;
        Ok(cursor.try_collect().await?)
    }

    async fn redeem_coupon(
        &self,
        code: &str,
        user_id: &str,
        now: DateTime,
    ) -> Result<bool, AppError> {
        let result = self
            .coupons
            .update_one(
                doc! {
                    "code": code,
                    "is_active": true,
                    "expiry_date": { "$gt": now },
                    "used_by": { "$ne": user_id },
                    "$or": [
                        { "usage_limit": Bson::Null },
                        { "$expr": { "$lt": [ { "$size": "$used_by" }, "$usage_limit" ] } },
                    ],
                },
                doc! {
                    "$push": { "used_by": user_id },
                    "$set": { "updated_at": DateTime::now() },
                },
                None,
            )
            .await?;
        Ok(result.matched_count > 0)
    }

    async fn release_coupon(&self, code: &str, user_id: &str) -> Result<(), AppError> {
        self.coupons
            .update_one(
                doc! { "code": code },
                doc! { "$pull": { "used_by": user_id } },
                None,
            )
            .await?;
        Ok(())
    }
}
